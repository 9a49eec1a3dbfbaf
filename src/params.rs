//! Technique parameters, instrument limits, and validation
//!
//! Every technique the library can drive has a parameter struct holding its
//! excitation values in base SI units (volts, volt/second, seconds, ampere/volt).
//! Validation happens exactly once, before any program text is generated, against
//! the limits of the instrument family that will run the program. A failed
//! validation is terminal for that run -- no partial program is ever emitted.

use thiserror::Error;

/// Cyclic voltammetry
///
/// Sweeps the working electrode between two vertex potentials at a fixed rate,
/// repeating for `sweeps` full cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct CvParams
{
    /// Initial potential, V
    pub e_init: f64,
    /// First vertex potential, V
    pub e_vertex1: f64,
    /// Second vertex potential, V
    pub e_vertex2: f64,
    /// Final potential, V
    pub e_final: f64,
    /// Scan rate, V/s
    pub scan_rate: f64,
    /// Potential increment per step, V
    pub e_step: f64,
    /// Number of sweeps
    pub sweeps: u32,
    /// Current sensitivity, A/V
    pub sensitivity: f64,
    /// Quiet time before the scan, s
    pub quiet_time: f64,
}

impl Default for CvParams
{
    fn default() -> Self
    {
        Self {
            e_init: -0.2,
            e_vertex1: 0.2,
            e_vertex2: -0.2,
            e_final: -0.2,
            scan_rate: 0.1,
            e_step: 0.001,
            sweeps: 2,
            sensitivity: 1e-6,
            quiet_time: 2.0,
        }
    }
}

/// Linear sweep voltammetry
///
/// A single unidirectional sweep from the initial to the final potential.
#[derive(Debug, Clone, PartialEq)]
pub struct LsvParams
{
    /// Initial potential, V
    pub e_init: f64,
    /// Final potential, V
    pub e_final: f64,
    /// Scan rate, V/s
    pub scan_rate: f64,
    /// Potential increment per step, V
    pub e_step: f64,
    /// Current sensitivity, A/V
    pub sensitivity: f64,
    /// Quiet time before the scan, s
    pub quiet_time: f64,
}

impl Default for LsvParams
{
    fn default() -> Self
    {
        Self {
            e_init: -0.2,
            e_final: 0.2,
            scan_rate: 0.1,
            e_step: 0.001,
            sensitivity: 1e-6,
            quiet_time: 2.0,
        }
    }
}

/// Step chronoamperometry (current vs. time at a fixed applied potential)
#[derive(Debug, Clone, PartialEq)]
pub struct ItParams
{
    /// Applied step potential, V
    pub e_applied: f64,
    /// Sampling interval, s
    pub interval: f64,
    /// Total run time, s
    pub total_time: f64,
    /// Current sensitivity, A/V
    pub sensitivity: f64,
    /// Quiet time before the step, s
    pub quiet_time: f64,
}

impl Default for ItParams
{
    fn default() -> Self
    {
        Self {
            e_applied: 0.2,
            interval: 0.001,
            total_time: 2.0,
            sensitivity: 1e-6,
            quiet_time: 2.0,
        }
    }
}

/// Cyclic step chronoamperometry
///
/// Alternates the applied potential between two vertex values with a fixed
/// pulse width. Used to determine conductivity.
#[derive(Debug, Clone, PartialEq)]
pub struct CaParams
{
    /// Initial potential, V
    pub e_init: f64,
    /// First vertex potential, V
    pub e_vertex1: f64,
    /// Second vertex potential, V
    pub e_vertex2: f64,
    /// Number of potential steps
    pub sweeps: u32,
    /// Pulse width, s
    pub pulse_width: f64,
    /// Current sensitivity, A/V
    pub sensitivity: f64,
    /// Quiet time before the first step, s
    pub quiet_time: f64,
}

impl Default for CaParams
{
    fn default() -> Self
    {
        Self {
            e_init: -0.025,
            e_vertex1: 0.025,
            e_vertex2: -0.025,
            sweeps: 200,
            pulse_width: 1e-4,
            sensitivity: 1e-4,
            quiet_time: 2.0,
        }
    }
}

/// Open circuit potential monitoring
///
/// The cell is left off and the rest potential is sampled over time. No
/// excitation is applied, so there are no potential-valued fields to bound.
#[derive(Debug, Clone, PartialEq)]
pub struct OcpParams
{
    /// Sampling interval, s
    pub interval: f64,
    /// Total run time, s
    pub total_time: f64,
}

impl Default for OcpParams
{
    fn default() -> Self
    {
        Self {
            interval: 0.01,
            total_time: 2.0,
        }
    }
}

/// Normal pulse voltammetry
#[derive(Debug, Clone, PartialEq)]
pub struct NpvParams
{
    /// Initial potential, V
    pub e_init: f64,
    /// Final potential, V
    pub e_final: f64,
    /// Potential increment per pulse, V
    pub e_step: f64,
    /// Sampling width, s
    pub t_sample: f64,
    /// Pulse width, s
    pub t_pulse: f64,
    /// Pulse period, s
    pub t_period: f64,
    /// Current sensitivity, A/V
    pub sensitivity: f64,
    /// Quiet time before the scan, s
    pub quiet_time: f64,
}

impl Default for NpvParams
{
    fn default() -> Self
    {
        Self {
            e_init: 0.5,
            e_final: -0.5,
            e_step: 0.01,
            t_sample: 0.1,
            t_pulse: 0.05,
            t_period: 10.0,
            sensitivity: 1e-6,
            quiet_time: 2.0,
        }
    }
}

/// Electrochemical impedance spectroscopy
#[derive(Debug, Clone, PartialEq)]
pub struct EisParams
{
    /// DC bias potential, V
    pub e_dc: f64,
    /// Lowest excitation frequency, Hz
    pub freq_low: f64,
    /// Highest excitation frequency, Hz
    pub freq_high: f64,
    /// Excitation amplitude, V
    pub amplitude: f64,
    /// Current sensitivity, A/V
    pub sensitivity: f64,
    /// Quiet time before the sweep, s
    pub quiet_time: f64,
}

impl Default for EisParams
{
    fn default() -> Self
    {
        Self {
            e_dc: 0.0,
            freq_low: 1.0,
            freq_high: 1000.0,
            amplitude: 0.01,
            sensitivity: 1e-6,
            quiet_time: 2.0,
        }
    }
}

/// Tag identifying a technique independently of its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Technique
{
    Cv,
    Lsv,
    It,
    Ca,
    Ocp,
    Npv,
    Eis,
}

impl Technique
{
    pub fn name(&self) -> &'static str
    {
        match self {
            Self::Cv => "CV",
            Self::Lsv => "LSV",
            Self::It => "IT",
            Self::Ca => "CA",
            Self::Ocp => "OCP",
            Self::Npv => "NPV",
            Self::Eis => "EIS",
        }
    }

    /// Whether a second working electrode channel can be added to this technique
    pub fn bipot_capable(&self) -> bool
    {
        match self {
            Self::Cv | Self::Lsv | Self::It | Self::Ca | Self::Npv => true,
            Self::Ocp | Self::Eis => false,
        }
    }
}

impl std::fmt::Display for Technique
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.write_str(self.name())
    }
}

/// Parameters for one run of any supported technique
#[derive(Debug, Clone, PartialEq)]
pub enum TechniqueParams
{
    Cv(CvParams),
    Lsv(LsvParams),
    It(ItParams),
    Ca(CaParams),
    Ocp(OcpParams),
    Npv(NpvParams),
    Eis(EisParams),
}

impl TechniqueParams
{
    pub fn technique(&self) -> Technique
    {
        match self {
            Self::Cv(_) => Technique::Cv,
            Self::Lsv(_) => Technique::Lsv,
            Self::It(_) => Technique::It,
            Self::Ca(_) => Technique::Ca,
            Self::Ocp(_) => Technique::Ocp,
            Self::Npv(_) => Technique::Npv,
            Self::Eis(_) => Technique::Eis,
        }
    }
}

/// An inclusive numeric bound on one kind of parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bound
{
    pub low: f64,
    pub high: f64,
}

/// Physical limits of one instrument family
///
/// The potential envelope is always enforced. The remaining bounds are
/// optional because the vendor documentation the limits were sourced from does
/// not state them for every family; an absent bound is an open policy, not a
/// pass. Callers with better documentation can fill them in.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentLimits
{
    /// Lowest potential the instrument can apply, V
    pub e_min: f64,
    /// Highest potential the instrument can apply, V
    pub e_max: f64,
    /// Scan rate bound, V/s
    pub scan_rate: Option<Bound>,
    /// Potential increment bound, V
    pub e_step: Option<Bound>,
    /// Sampling interval bound, s
    pub interval: Option<Bound>,
    /// Total run time bound, s
    pub total_time: Option<Bound>,
    /// Sensitivity bound, A/V
    pub sensitivity: Option<Bound>,
}

impl InstrumentLimits
{
    /// Limits of the MethodSCRIPT instrument family (EmStat Pico)
    pub fn script_family() -> Self
    {
        Self {
            e_min: -1.7,
            e_max: 2.0,
            scan_rate: None,
            e_step: None,
            interval: None,
            total_time: None,
            sensitivity: None,
        }
    }

    /// Limits of the macro instrument family (CH Instruments bench units)
    pub fn macro_family() -> Self
    {
        Self {
            e_min: -10.0,
            e_max: 10.0,
            scan_rate: None,
            e_step: None,
            interval: None,
            total_time: None,
            sensitivity: None,
        }
    }
}

/// A parameter validation failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidateError
{
    /// A field lies outside the instrument's supported range
    #[error("{field} should be between {low} {unit} and {high} {unit}. Received {value} {unit}")]
    OutOfRange
    {
        field: &'static str,
        value: f64,
        low: f64,
        high: f64,
        unit: &'static str,
    },
    /// A sweep or step count was zero
    #[error("{field} must be a positive count")]
    ZeroCount
    {
        field: &'static str,
    },
}

fn check(field: &'static str, value: f64, low: f64, high: f64, unit: &'static str)
    -> Result<(), ValidateError>
{
    if value < low || value > high {
        Err(ValidateError::OutOfRange {
            field: field,
            value: value,
            low: low,
            high: high,
            unit: unit,
        })
    }
    else {
        Ok(())
    }
}

fn check_opt(field: &'static str, value: f64, bound: &Option<Bound>, unit: &'static str)
    -> Result<(), ValidateError>
{
    match bound {
        Some(bound) => check(field, value, bound.low, bound.high, unit),
        None => Ok(()),
    }
}

fn check_count(field: &'static str, value: u32) -> Result<(), ValidateError>
{
    if value == 0 {
        Err(ValidateError::ZeroCount { field: field })
    }
    else {
        Ok(())
    }
}

/// Check a single potential value against the instrument envelope
///
/// Used on its own for the second working electrode potential, which is not
/// part of any technique's parameter struct.
pub fn check_potential(field: &'static str, value: f64, limits: &InstrumentLimits)
    -> Result<(), ValidateError>
{
    check(field, value, limits.e_min, limits.e_max, "V")
}

/// Validate every bounded field of `params` against `limits`
///
/// Pure; no program text is produced here. Bounds are inclusive on both ends.
pub fn validate(params: &TechniqueParams, limits: &InstrumentLimits) -> Result<(), ValidateError>
{
    match params {
        TechniqueParams::Cv(cv) => {
            check_potential("Eini", cv.e_init, limits)?;
            check_potential("Ev1", cv.e_vertex1, limits)?;
            check_potential("Ev2", cv.e_vertex2, limits)?;
            check_potential("Efin", cv.e_final, limits)?;
            check_opt("sr", cv.scan_rate, &limits.scan_rate, "V/s")?;
            check_opt("dE", cv.e_step, &limits.e_step, "V")?;
            check_opt("sens", cv.sensitivity, &limits.sensitivity, "A/V")?;
            check_count("nSweeps", cv.sweeps)
        },
        TechniqueParams::Lsv(lsv) => {
            check_potential("Eini", lsv.e_init, limits)?;
            check_potential("Efin", lsv.e_final, limits)?;
            check_opt("sr", lsv.scan_rate, &limits.scan_rate, "V/s")?;
            check_opt("dE", lsv.e_step, &limits.e_step, "V")?;
            check_opt("sens", lsv.sensitivity, &limits.sensitivity, "A/V")
        },
        TechniqueParams::It(it) => {
            check_potential("Estep", it.e_applied, limits)?;
            check_opt("dt", it.interval, &limits.interval, "s")?;
            check_opt("ttot", it.total_time, &limits.total_time, "s")?;
            check_opt("sens", it.sensitivity, &limits.sensitivity, "A/V")
        },
        TechniqueParams::Ca(ca) => {
            check_potential("Eini", ca.e_init, limits)?;
            check_potential("Ev1", ca.e_vertex1, limits)?;
            check_potential("Ev2", ca.e_vertex2, limits)?;
            check_opt("pw", ca.pulse_width, &limits.interval, "s")?;
            check_opt("sens", ca.sensitivity, &limits.sensitivity, "A/V")?;
            check_count("nSweeps", ca.sweeps)
        },
        TechniqueParams::Ocp(ocp) => {
            check_opt("dt", ocp.interval, &limits.interval, "s")?;
            check_opt("ttot", ocp.total_time, &limits.total_time, "s")
        },
        TechniqueParams::Npv(npv) => {
            check_potential("Eini", npv.e_init, limits)?;
            check_potential("Efin", npv.e_final, limits)?;
            check_opt("sens", npv.sensitivity, &limits.sensitivity, "A/V")
        },
        TechniqueParams::Eis(eis) => {
            check_potential("Eini", eis.e_dc, limits)?;
            check_potential("amp", eis.amplitude, limits)?;
            check_opt("sens", eis.sensitivity, &limits.sensitivity, "A/V")
        },
    }
}
