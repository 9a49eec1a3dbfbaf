//! Run orchestration: validate, generate, exchange, decode
//!
//! A run moves through a fixed sequence of stages: validate the parameters,
//! generate the instruction program (optionally extended with a second working
//! electrode channel), exchange it with the instrument over an opaque
//! transport, and decode the response into a [`MeasurementResult`]. A failure
//! at any stage ends the run with an error naming that stage; there are no
//! retries here -- retry policy belongs to whoever owns the transport.
//!
//! Creating transports is not this library's job so that callers are not tied
//! to one hardware interface. Anything implementing tokio's async read/write
//! traits works: a serial port handle, a TCP serial bridge, or a mock stream
//! in tests. The exchange is the only point where the core blocks.

use log::{ debug, warn };
use thiserror::Error;
use tokio::io::{ AsyncReadExt, AsyncWriteExt };

use crate::params::{ validate, InstrumentLimits, Technique, TechniqueParams, ValidateError };
use crate::program::{ generate, with_second_channel, Dialect, GenerateError, SecondChannel };
use crate::response::{
    decode, expected_tags, DecodeError, DecodePolicy, RawResponse, SampleRecord,
};

/// The structured outcome of one run: the only value that outlives it
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementResult
{
    /// Caller-supplied header describing the run
    pub header: String,
    pub technique: Technique,
    /// Whether the run actually measured a second working electrode channel
    pub bipot: bool,
    pub records: Vec<SampleRecord>,
}

/// An error from one run, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum RunError
{
    #[error("parameter validation failed: {0}")]
    Validate(#[from] ValidateError),
    #[error("program generation failed: {0}")]
    Generate(#[from] GenerateError),
    /// Propagated from the transport unchanged; the core adds no retries
    #[error("transport exchange failed: {0}")]
    Transport(#[from] std::io::Error),
    #[error("response was not valid text: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("response decoding failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Decode a previously captured response without touching a transport
///
/// This is the offline half of [`Instrument::run`]: the same schema selection
/// and decoding applied to lines loaded from a device log. Collected frame
/// faults are logged and dropped; use [`decode`] directly to inspect them.
pub fn decode_measurement(
    dialect: Dialect,
    technique: Technique,
    bipot: bool,
    header: &str,
    response: &RawResponse,
    policy: DecodePolicy,
)
    -> Result<MeasurementResult, DecodeError>
{
    let tags = expected_tags(technique, dialect, bipot)?;
    let decoded = decode(response, dialect, &tags, policy)?;

    for fault in &decoded.faults {
        warn!("{} response: skipped {}", technique, fault);
    }

    Ok(MeasurementResult {
        header: header.to_owned(),
        technique: technique,
        bipot: bipot,
        records: decoded.records,
    })
}

/// A handle driving one instrument through an async I/O stream
pub struct Instrument<T>
{
    dialect: Dialect,
    limits: InstrumentLimits,
    policy: DecodePolicy,
    io_handle: T,
    read_buf: Vec<u8>,
}

impl <T> Instrument<T>
{
    /// The limits runs on this handle are validated against
    pub fn limits(&self) -> &InstrumentLimits
    {
        &self.limits
    }

    /// Override the dialect-default limits, e.g. with bounds the caller has
    /// better documentation for
    pub fn set_limits(&mut self, limits: InstrumentLimits)
    {
        self.limits = limits;
    }

    pub fn set_decode_policy(&mut self, policy: DecodePolicy)
    {
        self.policy = policy;
    }
}

impl <T> Instrument<T>
    where T: AsyncReadExt + AsyncWriteExt + Unpin + Send
{
    /// Construct a handle over an async I/O stream speaking the given dialect
    ///
    /// Limits default to the dialect's instrument family and decoding to
    /// abort-on-first.
    pub fn with(dialect: Dialect, io_handle: T) -> Self
    {
        Self {
            dialect: dialect,
            limits: dialect.limits(),
            policy: DecodePolicy::AbortOnFirst,
            io_handle: io_handle,
            read_buf: Vec::with_capacity(128),
        }
    }

    /// Run one technique to completion and decode its results
    ///
    /// When `second` is requested for a technique without bipotentiostat
    /// mode, the run proceeds single-channel and the result's `bipot` flag
    /// stays false; every other error ends the run.
    ///
    /// # Cancel Safety
    /// Not cancel safe. Cancelling between the program write and the response
    /// read leaves the instrument mid-measurement with unread data on the
    /// stream.
    pub async fn run(
        &mut self,
        params: &TechniqueParams,
        header: &str,
        second: Option<SecondChannel>,
    )
        -> Result<MeasurementResult, RunError>
    {
        let technique = params.technique();

        validate(params, &self.limits)?;
        debug!("{}: parameters valid", technique);

        let (program, bipot) = match second {
            None => (generate(params, self.dialect)?, false),
            Some(chan) => match with_second_channel(params, self.dialect, chan) {
                Ok(program) => (program, true),
                Err(GenerateError::UnsupportedBipot { .. }) => {
                    warn!("{} does not have bipotentiostat mode; running single-channel", technique);
                    (generate(params, self.dialect)?, false)
                },
                Err(err) => return Err(err.into()),
            },
        };
        debug!("{}: generated {} byte program", technique, program.text().len());

        self.io_handle.write_all(program.text().as_bytes()).await?;
        let response = self.read_response().await?;
        debug!("{}: received {} response lines", technique, response.lines().len());

        Ok(decode_measurement(self.dialect, technique, bipot, header, &response, self.policy)?)
    }

    /// Read response lines until the stream ends
    ///
    /// Script-family instruments terminate their output with an empty line;
    /// macro-family bridges simply close or drain the stream, so end-of-input
    /// also ends the response.
    async fn read_response(&mut self) -> Result<RawResponse, RunError>
    {
        let mut response = RawResponse::default();

        loop {
            let line = match self.read_line().await? {
                Some(line) => line,
                None => break,
            };

            if line.is_empty() && self.dialect == Dialect::Script && !response.lines().is_empty() {
                break;
            }
            response.push_line(line);
        }

        Ok(response)
    }

    /// Read one LF-terminated line, stripping the terminator and any carriage
    /// return; `None` once the stream is exhausted
    async fn read_line(&mut self) -> Result<Option<String>, RunError>
    {
        loop {
            if let Some(end) = self.read_buf.iter().position(|byte| *byte == 0x0A) {
                let mut line: Vec<u8> = self.read_buf.drain(..=end).collect();
                line.pop();
                if line.last() == Some(&0x0D) {
                    line.pop();
                }
                return Ok(Some(String::from_utf8(line)?));
            }

            let mut temp_buf = [0u8; 64];
            let bytes_read = self.io_handle.read(&mut temp_buf[..]).await?;

            if bytes_read == 0 {
                // no trailing LF on the final line; hand back what's buffered
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                let line = String::from_utf8(std::mem::take(&mut self.read_buf))?;
                return Ok(Some(line));
            }

            self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);
        }
    }
}
