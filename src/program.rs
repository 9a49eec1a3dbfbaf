//! Instruction program generation for both instrument dialects
//!
//! Each technique maps to a fixed textual template per dialect. Generation is
//! deterministic: identical parameters and dialect always produce byte-identical
//! program text. Generation itself cannot fail on parameter values -- bounds are
//! the validator's job -- only on technique/dialect pairs with no mapping.
//!
//! # Dialect quirks
//! The script dialect templates reproduce the instrument's accepted text
//! exactly, including several asymmetries that look accidental but are required
//! for device compatibility:
//!   - The CV sweep loop takes `nscans(N-1)`: the loop runs N-1 scans beyond
//!     the first. Chronoamperometry and OCP loops take literal counts.
//!   - The dual-channel CV loop takes the literal `nscans(N)`.
//!   - The CV preamble inserts `wait 2` between `cell_on` and `timer_start`;
//!     LSV and chronoamperometry do not.
//!   - The chronoamperometry loop closes with an indented `\tendloop`.

use std::fmt::Write;
use thiserror::Error;

use crate::params::{
    check_potential, CaParams, CvParams, EisParams, InstrumentLimits, ItParams, LsvParams,
    NpvParams, OcpParams, Technique, TechniqueParams, ValidateError,
};

/// An instrument family's instruction vocabulary and numeric encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect
{
    /// CH Instruments macro language: `key=value` lines, native floating-point text
    Macro,
    /// PalmSens MethodSCRIPT: instruction lines, integer millivolt/millisecond encoding
    Script,
}

impl Dialect
{
    /// The physical limits of the instrument family that runs this dialect
    pub fn limits(&self) -> InstrumentLimits
    {
        match self {
            Self::Macro => InstrumentLimits::macro_family(),
            Self::Script => InstrumentLimits::script_family(),
        }
    }

    pub fn name(&self) -> &'static str
    {
        match self {
            Self::Macro => "macro",
            Self::Script => "script",
        }
    }
}

impl std::fmt::Display for Dialect
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.write_str(self.name())
    }
}

/// A complete instruction program for one run
///
/// Immutable once generated. Adding a second working electrode channel yields
/// a *new* program via [`with_second_channel`] because the set-up preamble
/// differs materially between single- and dual-channel runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionProgram
{
    dialect: Dialect,
    text: String,
}

impl InstructionProgram
{
    pub fn dialect(&self) -> Dialect
    {
        self.dialect
    }

    /// The program text, ready to be persisted or sent as-is
    pub fn text(&self) -> &str
    {
        &self.text
    }
}

/// A failure to map a technique onto a dialect
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerateError
{
    /// The selected dialect has no instruction mapping for this technique
    #[error("technique {technique} is not available on the {dialect} dialect")]
    UnsupportedTechnique
    {
        technique: Technique,
        dialect: Dialect,
    },
    /// The technique cannot run with a second working electrode
    #[error("technique {technique} does not have bipotentiostat mode")]
    UnsupportedBipot
    {
        technique: Technique,
    },
    /// The second channel's fixed potential lies outside the instrument envelope
    #[error("invalid second channel: {0}")]
    InvalidSecondChannel(#[from] ValidateError),
}

/// Second working electrode configuration for dual-channel runs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondChannel
{
    /// Fixed potential of the second working electrode, V
    pub e_second: f64,
    /// Current sensitivity of the second channel, A/V
    pub sensitivity: f64,
}

/// Encode a physical value as the script dialect's integer millis
///
/// The script dialect embeds potentials as whole millivolts and times as whole
/// milliseconds. Precision beyond 1 mV / 1 ms is lost here by design.
fn millis(value: f64) -> i64
{
    (value * 1000.0).round() as i64
}

/// Generate the program for `params` in the given dialect
///
/// Assumes the parameters were already validated; only unmapped
/// technique/dialect pairs fail.
pub fn generate(params: &TechniqueParams, dialect: Dialect)
    -> Result<InstructionProgram, GenerateError>
{
    let text = match dialect {
        Dialect::Script => script_text(params, None)?,
        Dialect::Macro => macro_text(params, None)?,
    };

    Ok(InstructionProgram {
        dialect: dialect,
        text: text,
    })
}

/// Generate a dual-channel program for `params` in the given dialect
///
/// Only defined for the bipotentiostat-capable techniques. The second
/// channel's potential is checked against the dialect's envelope here because
/// it is not part of any technique parameter struct. The result is a fresh
/// program; no previously generated program is altered.
pub fn with_second_channel(
    params: &TechniqueParams,
    dialect: Dialect,
    second: SecondChannel,
)
    -> Result<InstructionProgram, GenerateError>
{
    let technique = params.technique();

    if !technique.bipot_capable() {
        return Err(GenerateError::UnsupportedBipot { technique: technique });
    }

    check_potential("E2", second.e_second, &dialect.limits())?;

    let text = match dialect {
        Dialect::Script => script_text(params, Some(second))?,
        Dialect::Macro => macro_text(params, Some(second))?,
    };

    Ok(InstructionProgram {
        dialect: dialect,
        text: text,
    })
}

fn unsupported(technique: Technique, dialect: Dialect) -> GenerateError
{
    GenerateError::UnsupportedTechnique {
        technique: technique,
        dialect: dialect,
    }
}

//
// Script dialect (MethodSCRIPT)
//

/// Variable declarations; `e` puts the instrument into script-execution mode
fn script_header(vars: &[char]) -> String
{
    let mut text = String::from("e\n");
    for var in vars {
        let _ = writeln!(text, "var {}", var);
    }
    text
}

/// Single-channel measurement preamble: mode, auto-ranging, applied potential
fn script_preamble(mode: u32, e_applied: f64, wait: bool) -> String
{
    let mut text = format!(
        "set_pgstat_mode {}\nset_autoranging ba 100n 5m\nset_e {}m\ncell_on\n",
        mode,
        millis(e_applied),
    );
    if wait {
        text.push_str("wait 2\n");
    }
    text.push_str("timer_start");
    text
}

/// Dual-channel preamble: channel 1 fixed at the second potential in polystat
/// mode, then channel 0 restored to the primary configuration
fn script_bipot_preamble(e_second: f64, e_primary: f64) -> String
{
    format!(
        "var b\nset_pgstat_chan 1\nset_pgstat_mode 5\nset_poly_we_mode 0\nset_e {}m\n\
         set_autoranging ba 100n 5m\nset_pgstat_chan 0\nset_pgstat_mode 2\n\
         set_autoranging ba 100n 5m\nset_e {}m\ntimer_start\ncell_on",
        millis(e_second),
        millis(e_primary),
    )
}

/// One packet per sample: time, potential, current, and optionally the second
/// channel. `tail` is the loop terminator, which is not uniform across loops.
fn script_packet_body(second: bool, tail: &str) -> String
{
    let mut text = String::from("\n\tpck_start\n\ttimer_get a\n\tpck_add a\n\tpck_add p\n\tpck_add c");
    if second {
        text.push_str("\n\tpck_add b");
    }
    text.push_str("\n\tpck_end\n");
    text.push_str(tail);
    text.push_str("\non_finished:\ncell_off\n\n");
    text
}

fn script_cv(cv: &CvParams, second: Option<SecondChannel>) -> String
{
    let mut text = script_header(&['c', 'p', 'a']);

    match second {
        None => {
            text.push_str(&script_preamble(4, cv.e_init, true));
            // dialect convention: the loop runs nSweeps-1 scans beyond the
            // first; the validator owns sweeps >= 1, so saturate rather than
            // underflow on unvalidated input
            let _ = write!(
                text,
                "\nmeas_loop_cv p c {}m {}m {}m {}m {}m nscans({})",
                millis(cv.e_init),
                millis(cv.e_vertex1),
                millis(cv.e_vertex2),
                millis(cv.e_step),
                millis(cv.scan_rate),
                cv.sweeps.saturating_sub(1),
            );
            text.push_str(&script_packet_body(false, "endloop"));
        },
        Some(chan) => {
            text.push_str(&script_bipot_preamble(chan.e_second, cv.e_init));
            // the dual-channel loop takes the literal count; the instrument
            // rejects the minus-one form here
            let _ = write!(
                text,
                "\nmeas_loop_cv p c {}m {}m {}m {}m {}m nscans({}) poly_we(1 b)",
                millis(cv.e_init),
                millis(cv.e_vertex1),
                millis(cv.e_vertex2),
                millis(cv.e_step),
                millis(cv.scan_rate),
                cv.sweeps,
            );
            text.push_str(&script_packet_body(true, "endloop"));
        },
    }

    text
}

fn script_lsv(lsv: &LsvParams, second: Option<SecondChannel>) -> String
{
    let mut text = script_header(&['c', 'p', 'a']);

    match second {
        None => {
            text.push_str(&script_preamble(4, lsv.e_init, false));
            let _ = write!(
                text,
                "\nmeas_loop_lsv p c {}m {}m {}m {}m",
                millis(lsv.e_init),
                millis(lsv.e_final),
                millis(lsv.e_step),
                millis(lsv.scan_rate),
            );
            text.push_str(&script_packet_body(false, "endloop"));
        },
        Some(chan) => {
            text.push_str(&script_bipot_preamble(chan.e_second, lsv.e_init));
            let _ = write!(
                text,
                "\nmeas_loop_lsv p c {}m {}m {}m {}m poly_we(1 b)",
                millis(lsv.e_init),
                millis(lsv.e_final),
                millis(lsv.e_step),
                millis(lsv.scan_rate),
            );
            text.push_str(&script_packet_body(true, "endloop"));
        },
    }

    text
}

fn script_it(it: &ItParams, second: Option<SecondChannel>) -> String
{
    let mut text = script_header(&['p', 'c', 'a']);

    match second {
        None => {
            text.push_str(&script_preamble(3, it.e_applied, false));
            let _ = write!(
                text,
                "\nmeas_loop_ca p c {}m {}m {}m",
                millis(it.e_applied),
                millis(it.interval),
                millis(it.total_time),
            );
            // single-channel chronoamperometry closes with an indented endloop
            text.push_str(&script_packet_body(false, "\tendloop"));
        },
        Some(chan) => {
            text.push_str(&script_bipot_preamble(chan.e_second, it.e_applied));
            let _ = write!(
                text,
                "\nmeas_loop_ca p c {}m {}m {}m poly_we(1 b)",
                millis(it.e_applied),
                millis(it.interval),
                millis(it.total_time),
            );
            text.push_str(&script_packet_body(true, "endloop"));
        },
    }

    text
}

fn script_ocp(ocp: &OcpParams) -> String
{
    let mut text = script_header(&['p', 'a']);
    text.push_str("set_pgstat_mode 4\ncell_off\ntimer_start\n");
    // trailing space after the total time is accepted and matches the
    // program text the instrument was qualified against
    let _ = write!(
        text,
        "meas_loop_ocp p {}m {}m ",
        millis(ocp.interval),
        millis(ocp.total_time),
    );
    text.push_str("\n\tpck_start\n\ttimer_get a\n\tpck_add a\n\tpck_add p\n\tpck_end\nendloop\non_finished:\ncell_off\n\n");
    text
}

fn script_text(params: &TechniqueParams, second: Option<SecondChannel>)
    -> Result<String, GenerateError>
{
    match params {
        TechniqueParams::Cv(cv) => Ok(script_cv(cv, second)),
        TechniqueParams::Lsv(lsv) => Ok(script_lsv(lsv, second)),
        TechniqueParams::It(it) => Ok(script_it(it, second)),
        TechniqueParams::Ocp(ocp) => Ok(script_ocp(ocp)),
        TechniqueParams::Ca(_) | TechniqueParams::Npv(_) | TechniqueParams::Eis(_) => {
            Err(unsupported(params.technique(), Dialect::Script))
        },
    }
}

//
// Macro dialect (CH Instruments)
//

/// `key=value` line with native floating-point text
fn macro_line(text: &mut String, key: &str, value: f64)
{
    let _ = writeln!(text, "{}={}", key, value);
}

/// Sensitivities are written in exponent notation, the form the vendor
/// software itself produces
fn macro_sens_line(text: &mut String, key: &str, value: f64)
{
    let _ = writeln!(text, "{}={:e}", key, value);
}

fn macro_footer(text: &mut String, second: Option<SecondChannel>)
{
    if let Some(chan) = second {
        macro_line(text, "e2", chan.e_second);
        macro_sens_line(text, "sens2", chan.sensitivity);
    }
    text.push_str("run\n");
}

fn macro_cv(cv: &CvParams, second: Option<SecondChannel>) -> String
{
    let mut text = String::from("tech=cv\n");
    macro_line(&mut text, "ei", cv.e_init);
    macro_line(&mut text, "eh", cv.e_vertex1.max(cv.e_vertex2));
    macro_line(&mut text, "el", cv.e_vertex1.min(cv.e_vertex2));
    // initial sweep polarity follows the direction toward the first vertex
    let _ = writeln!(text, "pn={}", if cv.e_vertex1 >= cv.e_init { 'p' } else { 'n' });
    let _ = writeln!(text, "cl={}", cv.sweeps);
    text.push_str("efon\n");
    macro_line(&mut text, "ef", cv.e_final);
    macro_sens_line(&mut text, "si", cv.sensitivity);
    macro_line(&mut text, "qt", cv.quiet_time);
    macro_line(&mut text, "v", cv.scan_rate);
    macro_footer(&mut text, second);
    text
}

fn macro_lsv(lsv: &LsvParams, second: Option<SecondChannel>) -> String
{
    let mut text = String::from("tech=lsv\n");
    macro_line(&mut text, "ei", lsv.e_init);
    macro_line(&mut text, "ef", lsv.e_final);
    macro_line(&mut text, "v", lsv.scan_rate);
    macro_sens_line(&mut text, "si", lsv.sensitivity);
    macro_line(&mut text, "qt", lsv.quiet_time);
    macro_footer(&mut text, second);
    text
}

fn macro_it(it: &ItParams, second: Option<SecondChannel>) -> String
{
    let mut text = String::from("tech=i-t\n");
    macro_line(&mut text, "ei", it.e_applied);
    macro_line(&mut text, "st", it.total_time);
    macro_line(&mut text, "dt", it.interval);
    macro_sens_line(&mut text, "si", it.sensitivity);
    macro_line(&mut text, "qt", it.quiet_time);
    macro_footer(&mut text, second);
    text
}

fn macro_ca(ca: &CaParams, second: Option<SecondChannel>) -> String
{
    let mut text = String::from("tech=ca\n");
    macro_line(&mut text, "ei", ca.e_init);
    macro_line(&mut text, "eh", ca.e_vertex1.max(ca.e_vertex2));
    macro_line(&mut text, "el", ca.e_vertex1.min(ca.e_vertex2));
    let _ = writeln!(text, "cl={}", ca.sweeps);
    macro_line(&mut text, "pw", ca.pulse_width);
    macro_sens_line(&mut text, "si", ca.sensitivity);
    macro_line(&mut text, "qt", ca.quiet_time);
    macro_footer(&mut text, second);
    text
}

fn macro_ocp(ocp: &OcpParams) -> String
{
    let mut text = String::from("tech=ocpt\n");
    macro_line(&mut text, "st", ocp.total_time);
    macro_line(&mut text, "dt", ocp.interval);
    text.push_str("run\n");
    text
}

fn macro_npv(npv: &NpvParams, second: Option<SecondChannel>) -> String
{
    let mut text = String::from("tech=npv\n");
    macro_line(&mut text, "ei", npv.e_init);
    macro_line(&mut text, "ef", npv.e_final);
    macro_line(&mut text, "incre", npv.e_step);
    macro_line(&mut text, "pw", npv.t_pulse);
    macro_line(&mut text, "sw", npv.t_sample);
    macro_line(&mut text, "pd", npv.t_period);
    macro_sens_line(&mut text, "si", npv.sensitivity);
    macro_line(&mut text, "qt", npv.quiet_time);
    macro_footer(&mut text, second);
    text
}

fn macro_eis(eis: &EisParams) -> String
{
    let mut text = String::from("tech=imp\n");
    macro_line(&mut text, "ei", eis.e_dc);
    macro_line(&mut text, "fl", eis.freq_low);
    macro_line(&mut text, "fh", eis.freq_high);
    macro_line(&mut text, "amp", eis.amplitude);
    macro_sens_line(&mut text, "si", eis.sensitivity);
    macro_line(&mut text, "qt", eis.quiet_time);
    text.push_str("run\n");
    text
}

fn macro_text(params: &TechniqueParams, second: Option<SecondChannel>)
    -> Result<String, GenerateError>
{
    match params {
        TechniqueParams::Cv(cv) => Ok(macro_cv(cv, second)),
        TechniqueParams::Lsv(lsv) => Ok(macro_lsv(lsv, second)),
        TechniqueParams::It(it) => Ok(macro_it(it, second)),
        TechniqueParams::Ca(ca) => Ok(macro_ca(ca, second)),
        TechniqueParams::Ocp(ocp) => Ok(macro_ocp(ocp)),
        TechniqueParams::Npv(npv) => Ok(macro_npv(npv, second)),
        TechniqueParams::Eis(eis) => Ok(macro_eis(eis)),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn default_cv() -> TechniqueParams
    {
        TechniqueParams::Cv(CvParams::default())
    }

    #[test]
    fn generation_is_deterministic()
    {
        let first = generate(&default_cv(), Dialect::Script).unwrap();
        let second = generate(&default_cv(), Dialect::Script).unwrap();
        assert_eq!(first.text(), second.text());

        let first = generate(&default_cv(), Dialect::Macro).unwrap();
        let second = generate(&default_cv(), Dialect::Macro).unwrap();
        assert_eq!(first.text(), second.text());
    }

    #[test]
    fn script_cv_full_text()
    {
        // Eini=-0.2, Ev1=0.2, Ev2=-0.2, sr=0.1, dE=0.001, nSweeps=2: the loop
        // must carry -200m 200m -200m 1m 100m and the scan count literal 1
        let program = generate(&default_cv(), Dialect::Script).unwrap();

        assert_eq!(
            program.text(),
            "e\nvar c\nvar p\nvar a\n\
             set_pgstat_mode 4\nset_autoranging ba 100n 5m\nset_e -200m\ncell_on\nwait 2\ntimer_start\n\
             meas_loop_cv p c -200m 200m -200m 1m 100m nscans(1)\n\
             \tpck_start\n\ttimer_get a\n\tpck_add a\n\tpck_add p\n\tpck_add c\n\tpck_end\n\
             endloop\non_finished:\ncell_off\n\n"
        );
    }

    #[test]
    fn script_cv_scan_count_is_sweeps_minus_one()
    {
        let params = TechniqueParams::Cv(CvParams { sweeps: 5, ..CvParams::default() });
        let program = generate(&params, Dialect::Script).unwrap();
        assert!(program.text().contains("nscans(4)"));
    }

    #[test]
    fn unvalidated_zero_sweep_count_does_not_underflow()
    {
        // the validator rejects sweeps == 0, but generate is public and must
        // not panic or wrap when handed the value anyway
        let params = TechniqueParams::Cv(CvParams { sweeps: 0, ..CvParams::default() });
        let program = generate(&params, Dialect::Script).unwrap();
        assert!(program.text().contains("nscans(0)"));
    }

    #[test]
    fn script_bipot_cv_uses_literal_scan_count()
    {
        let second = SecondChannel { e_second: -0.2, sensitivity: 1e-6 };
        let program = with_second_channel(&default_cv(), Dialect::Script, second).unwrap();

        assert!(program.text().contains("nscans(2) poly_we(1 b)"));
        assert!(program.text().contains("var b\nset_pgstat_chan 1\nset_pgstat_mode 5\nset_poly_we_mode 0\nset_e -200m"));
        assert!(program.text().contains("\tpck_add c\n\tpck_add b\n\tpck_end"));
    }

    #[test]
    fn script_lsv_has_no_scan_count()
    {
        let program = generate(&TechniqueParams::Lsv(LsvParams::default()), Dialect::Script).unwrap();
        assert!(program.text().contains("meas_loop_lsv p c -200m 200m 1m 100m\n"));
        assert!(!program.text().contains("nscans"));
    }

    #[test]
    fn script_it_loop_uses_literal_times_and_indented_endloop()
    {
        let program = generate(&TechniqueParams::It(ItParams::default()), Dialect::Script).unwrap();
        assert!(program.text().contains("meas_loop_ca p c 200m 1m 2000m\n"));
        assert!(program.text().contains("\tpck_end\n\tendloop\n"));
    }

    #[test]
    fn script_ocp_samples_potential_only_with_cell_off()
    {
        let program = generate(&TechniqueParams::Ocp(OcpParams::default()), Dialect::Script).unwrap();

        assert_eq!(
            program.text(),
            "e\nvar p\nvar a\n\
             set_pgstat_mode 4\ncell_off\ntimer_start\n\
             meas_loop_ocp p 10m 2000m \n\
             \tpck_start\n\ttimer_get a\n\tpck_add a\n\tpck_add p\n\tpck_end\n\
             endloop\non_finished:\ncell_off\n\n"
        );
    }

    #[test]
    fn millis_rounds_instead_of_truncating()
    {
        assert_eq!(millis(0.0999), 100);
        assert_eq!(millis(-0.0999), -100);
        assert_eq!(millis(0.2), 200);
    }

    #[test]
    fn macro_cv_text()
    {
        let program = generate(&default_cv(), Dialect::Macro).unwrap();

        assert_eq!(
            program.text(),
            "tech=cv\nei=-0.2\neh=0.2\nel=-0.2\npn=p\ncl=2\nefon\nef=-0.2\nsi=1e-6\nqt=2\nv=0.1\nrun\n"
        );
    }

    #[test]
    fn macro_bipot_adds_second_channel_before_run()
    {
        let second = SecondChannel { e_second: -0.3, sensitivity: 1e-6 };
        let program = with_second_channel(&default_cv(), Dialect::Macro, second).unwrap();
        assert!(program.text().ends_with("e2=-0.3\nsens2=1e-6\nrun\n"));
    }

    #[test]
    fn unsupported_pairs_are_reported()
    {
        let eis = TechniqueParams::Eis(EisParams::default());
        assert_eq!(
            generate(&eis, Dialect::Script),
            Err(GenerateError::UnsupportedTechnique {
                technique: Technique::Eis,
                dialect: Dialect::Script,
            })
        );

        let ca = TechniqueParams::Ca(CaParams::default());
        assert!(generate(&ca, Dialect::Script).is_err());
        assert!(generate(&ca, Dialect::Macro).is_ok());
    }

    #[test]
    fn bipot_on_ocp_is_rejected()
    {
        let second = SecondChannel { e_second: -0.2, sensitivity: 1e-6 };
        let err = with_second_channel(&TechniqueParams::Ocp(OcpParams::default()), Dialect::Script, second)
            .unwrap_err();

        assert_eq!(err, GenerateError::UnsupportedBipot { technique: Technique::Ocp });
    }

    #[test]
    fn bipot_potential_is_validated()
    {
        let second = SecondChannel { e_second: 2.5, sensitivity: 1e-6 };
        let err = with_second_channel(&default_cv(), Dialect::Script, second).unwrap_err();

        match err {
            GenerateError::InvalidSecondChannel(ValidateError::OutOfRange { field, .. }) => {
                assert_eq!(field, "E2");
            },
            other => panic!("expected InvalidSecondChannel, got {:?}", other),
        }
    }
}
