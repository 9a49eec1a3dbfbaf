//! Response stream decoding
//!
//! The instrument's reply is an ordered sequence of text lines. The script
//! dialect frames each sample between explicit start/end marker lines with one
//! line per tagged variable in between; the macro dialect returns a header
//! followed by a comma-separated column table. Both decode to the same
//! schema-uniform sequence of [`SampleRecord`]s.
//!
//! Decoding carries no technique semantics: there is no cross-record
//! validation (monotonic time and the like belong to downstream analysis).

use thiserror::Error;

use crate::params::Technique;
use crate::program::Dialect;

pub(crate) mod mscript;
pub(crate) mod table;

/// Which physical quantity a decoded line represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarTag
{
    /// Elapsed time since `timer_start`, seconds
    Time,
    /// Working electrode 1 potential, volts
    Potential,
    /// Working electrode 1 current, amperes
    Current,
    /// Second working electrode channel, amperes
    Second,
}

impl VarTag
{
    /// The single-character tag used on the wire
    pub fn wire_char(&self) -> char
    {
        match self {
            Self::Time => 'a',
            Self::Potential => 'p',
            Self::Current => 'c',
            Self::Second => 'b',
        }
    }

    pub fn from_wire(tag: char) -> Option<Self>
    {
        match tag {
            'a' => Some(Self::Time),
            'p' => Some(Self::Potential),
            'c' => Some(Self::Current),
            'b' => Some(Self::Second),
            _ => None,
        }
    }

    /// Base SI unit of values carrying this tag
    pub fn unit(&self) -> &'static str
    {
        match self {
            Self::Time => "s",
            Self::Potential => "V",
            Self::Current => "A",
            Self::Second => "A",
        }
    }
}

/// Scale factor for a wire SI-prefix suffix character
///
/// The script dialect appends one of these to every mantissa. A line whose
/// value ends in a bare digit carries no prefix and scales by one.
pub(crate) fn prefix_scale(prefix: char) -> Option<f64>
{
    match prefix {
        'f' => Some(1e-15),
        'p' => Some(1e-12),
        'n' => Some(1e-9),
        'u' => Some(1e-6),
        'm' => Some(1e-3),
        ' ' => Some(1.0),
        'k' => Some(1e3),
        'M' => Some(1e6),
        'G' => Some(1e9),
        _ => None,
    }
}

/// One decoded variable: its tag and its value scaled to base SI units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaggedVariable
{
    pub tag: VarTag,
    pub value: f64,
}

/// One decoded measurement point: the variables sharing one frame
///
/// Every record in one decoded result carries the same set of tags, in the
/// same order the generator emitted them.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord
{
    vars: Vec<TaggedVariable>,
}

impl SampleRecord
{
    pub(crate) fn with_vars(vars: Vec<TaggedVariable>) -> Self
    {
        Self { vars: vars }
    }

    pub fn vars(&self) -> &[TaggedVariable]
    {
        &self.vars
    }

    pub fn get(&self, tag: VarTag) -> Option<f64>
    {
        self.vars.iter().find(|var| var.tag == tag).map(|var| var.value)
    }

    pub fn time(&self) -> Option<f64>
    {
        self.get(VarTag::Time)
    }

    pub fn potential(&self) -> Option<f64>
    {
        self.get(VarTag::Potential)
    }

    pub fn current(&self) -> Option<f64>
    {
        self.get(VarTag::Current)
    }

    pub fn second_channel(&self) -> Option<f64>
    {
        self.get(VarTag::Second)
    }
}

/// The raw line stream delivered by the instrument or loaded from a device log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse
{
    lines: Vec<String>,
}

impl RawResponse
{
    pub fn from_lines(lines: Vec<String>) -> Self
    {
        Self { lines: lines }
    }

    /// Split a captured response on line feeds, dropping carriage returns
    pub fn from_text(text: &str) -> Self
    {
        Self {
            lines: text
                .split('\n')
                .map(|line| line.trim_end_matches('\r').to_owned())
                .collect(),
        }
    }

    pub(crate) fn push_line(&mut self, line: String)
    {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String]
    {
        &self.lines
    }
}

/// What to do when a malformed frame is encountered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePolicy
{
    /// Surface the first fault as an error; no records are produced
    AbortOnFirst,
    /// Skip faulty frames, keep decoding, and report the faults alongside the
    /// records that did decode
    CollectAndContinue,
}

/// Why a single frame could not be decoded
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameFaultKind
{
    #[error("expected tag '{}' missing from frame", .0.wire_char())]
    MissingTag(VarTag),
    #[error("unrecognized tag '{0}'")]
    UnknownTag(char),
    #[error("tag '{}' does not belong to this frame's schema", .0.wire_char())]
    UnexpectedTag(VarTag),
    #[error("tag '{}' appears more than once in one frame", .0.wire_char())]
    DuplicateTag(VarTag),
    #[error("unparseable value `{0}`")]
    BadValue(String),
    #[error("unrecognized unit prefix '{0}'")]
    BadPrefix(char),
    #[error("frame is missing its end marker")]
    Truncated,
    #[error("expected {expected} columns, found {found}")]
    ColumnCount
    {
        expected: usize,
        found: usize,
    },
}

/// A malformed frame, located by the zero-based index of the line at which the
/// frame starts (for missing-tag and truncation faults) or of the offending
/// line itself
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed frame at line {line_index}: {kind}")]
pub struct FrameFault
{
    pub line_index: usize,
    pub kind: FrameFaultKind,
}

/// A decoding failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError
{
    #[error(transparent)]
    MalformedFrame(#[from] FrameFault),
    /// The technique produces no decodable sample stream (impedance results
    /// are complex-valued and out of the sample model)
    #[error("technique {0} has no response schema")]
    NoSchema(Technique),
}

/// The outcome of a decode pass
///
/// Under [`DecodePolicy::AbortOnFirst`], `faults` is always empty. Under
/// [`DecodePolicy::CollectAndContinue`] it holds one entry per skipped frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded
{
    pub records: Vec<SampleRecord>,
    pub faults: Vec<FrameFault>,
}

/// The tags one frame of this technique's response carries, in wire order
///
/// The two dialects report different variable sets: the script dialect stamps
/// every packet with the loop timer, while the macro dialect's sweep tables
/// carry no time column.
pub fn expected_tags(technique: Technique, dialect: Dialect, bipot: bool)
    -> Result<Vec<VarTag>, DecodeError>
{
    let mut tags = match (dialect, technique) {
        (Dialect::Script, Technique::Ocp) => vec![VarTag::Time, VarTag::Potential],
        (Dialect::Script, _) => vec![VarTag::Time, VarTag::Potential, VarTag::Current],
        (Dialect::Macro, Technique::Ocp) => vec![VarTag::Time, VarTag::Potential],
        (Dialect::Macro, Technique::It) => vec![VarTag::Time, VarTag::Current],
        (Dialect::Macro, Technique::Eis) => return Err(DecodeError::NoSchema(technique)),
        (Dialect::Macro, _) => vec![VarTag::Potential, VarTag::Current],
    };

    if bipot {
        tags.push(VarTag::Second);
    }

    Ok(tags)
}

/// Decode a raw response into sample records
///
/// `tags` is the schema every frame must carry, normally obtained from
/// [`expected_tags`]. The output length equals the number of well-formed
/// frames found; under abort-on-first, any fault means no output at all.
pub fn decode(
    response: &RawResponse,
    dialect: Dialect,
    tags: &[VarTag],
    policy: DecodePolicy,
)
    -> Result<Decoded, DecodeError>
{
    match dialect {
        Dialect::Script => mscript::decode(response, tags, policy),
        Dialect::Macro => table::decode(response, tags, policy),
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn tags_round_trip_through_wire_chars()
    {
        for tag in [VarTag::Time, VarTag::Potential, VarTag::Current, VarTag::Second] {
            assert_eq!(VarTag::from_wire(tag.wire_char()), Some(tag));
        }
        assert_eq!(VarTag::from_wire('z'), None);
    }

    #[test]
    fn script_schema_matches_generated_packets()
    {
        let tags = expected_tags(Technique::Cv, Dialect::Script, false).unwrap();
        assert_eq!(tags, vec![VarTag::Time, VarTag::Potential, VarTag::Current]);

        let tags = expected_tags(Technique::Cv, Dialect::Script, true).unwrap();
        assert_eq!(
            tags,
            vec![VarTag::Time, VarTag::Potential, VarTag::Current, VarTag::Second]
        );

        let tags = expected_tags(Technique::Ocp, Dialect::Script, false).unwrap();
        assert_eq!(tags, vec![VarTag::Time, VarTag::Potential]);
    }

    #[test]
    fn macro_sweep_tables_have_no_time_column()
    {
        let tags = expected_tags(Technique::Cv, Dialect::Macro, false).unwrap();
        assert_eq!(tags, vec![VarTag::Potential, VarTag::Current]);

        let tags = expected_tags(Technique::It, Dialect::Macro, false).unwrap();
        assert_eq!(tags, vec![VarTag::Time, VarTag::Current]);
    }

    #[test]
    fn impedance_has_no_sample_schema()
    {
        assert_eq!(
            expected_tags(Technique::Eis, Dialect::Macro, false),
            Err(DecodeError::NoSchema(Technique::Eis))
        );
    }

    #[test]
    fn response_from_text_strips_carriage_returns()
    {
        let response = RawResponse::from_text("P\r\na100u\r\n");
        assert_eq!(response.lines()[0], "P");
        assert_eq!(response.lines()[1], "a100u");
    }
}
