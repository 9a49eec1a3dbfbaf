//! **E**lectro**chem**istry **script**ing for serial potentiostats
//!
//! This library drives potentiostats by generating vendor-specific instruction
//! programs and decoding the device's response stream into structured, unit
//! scaled measurement series. Two instrument script dialects are supported:
//!
//!   - **Macro** -- the CH Instruments macro language. `key=value` lines with
//!     native floating-point text; results come back as a column table.
//!   - **Script** -- PalmSens MethodSCRIPT as spoken by the EmStat Pico.
//!     Instruction lines with integer millivolt/millisecond encoding; results
//!     come back as framed packets, one line per tagged variable.
//!
//! The supported techniques are cyclic voltammetry (CV), linear sweep
//! voltammetry (LSV), step chronoamperometry (IT), cyclic step
//! chronoamperometry (CA), open circuit potential monitoring (OCP), normal
//! pulse voltammetry (NPV), and impedance spectroscopy (EIS). Not every
//! technique maps onto every dialect; asking for an unmapped pair is a
//! reported error, never a silently wrong program. CV, LSV, IT, CA, and NPV
//! can additionally run in bipotentiostat mode, measuring a second working
//! electrode held at a fixed potential.
//!
//! # Scope
//! The library is the protocol layer only. It consumes technique parameters
//! and produces program text; it consumes response lines and produces sample
//! records. Opening serial ports, naming macro files, plotting, and
//! persistence all belong to the caller. The one I/O seam is the
//! [`Instrument`] handle, which drives any stream implementing tokio's async
//! read/write traits -- a serial port, a TCP bridge, or a mock in tests.
//!
//! # Example
//! Generate a cyclic voltammetry program for an EmStat Pico without touching
//! any hardware:
//!
//! ```
//! use echem_script::{ generate, validate, CvParams, Dialect, TechniqueParams };
//!
//! let params = TechniqueParams::Cv(CvParams {
//!     e_init: -0.2,
//!     e_vertex1: 0.4,
//!     ..CvParams::default()
//! });
//!
//! validate(&params, &Dialect::Script.limits()).unwrap();
//! let program = generate(&params, Dialect::Script).unwrap();
//! assert!(program.text().starts_with("e\nvar c\nvar p\nvar a\n"));
//! ```

pub mod dispatch;
pub mod params;
pub mod program;
pub mod response;

pub use dispatch::{ decode_measurement, Instrument, MeasurementResult, RunError };
pub use params::{
    validate, Bound, CaParams, CvParams, EisParams, InstrumentLimits, ItParams, LsvParams,
    NpvParams, OcpParams, Technique, TechniqueParams, ValidateError,
};
pub use program::{
    generate, with_second_channel, Dialect, GenerateError, InstructionProgram, SecondChannel,
};
pub use response::{
    decode, expected_tags, DecodeError, DecodePolicy, Decoded, FrameFault, FrameFaultKind,
    RawResponse, SampleRecord, TaggedVariable, VarTag,
};
