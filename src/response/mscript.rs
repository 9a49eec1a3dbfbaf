//! Framed packet parsing for the script dialect
//!
//! Each sample arrives as a frame: a start marker line `P`, one line per
//! tagged variable, and an end marker line `*`. A variable line is the tag
//! character, a signed integer mantissa, and an optional SI prefix suffix,
//! e.g. `p-200m` for −0.2 V or `a1200u` for 1.2 ms. Echo lines and blank
//! lines outside frames are ignored.

use super::{
    prefix_scale, DecodePolicy, Decoded, DecodeError, FrameFault, FrameFaultKind, RawResponse,
    SampleRecord, TaggedVariable, VarTag,
};

const FRAME_START: &str = "P";
const FRAME_END: &str = "*";

/// Parse one variable line into a tag and a base-SI value
fn parse_var(line: &str) -> Result<TaggedVariable, FrameFaultKind>
{
    let mut chars = line.chars();
    let tag_char = chars.next().ok_or(FrameFaultKind::BadValue(line.to_owned()))?;
    let tag = VarTag::from_wire(tag_char).ok_or(FrameFaultKind::UnknownTag(tag_char))?;

    let body = chars.as_str();
    if body.is_empty() {
        return Err(FrameFaultKind::BadValue(line.to_owned()));
    }

    let (mantissa_str, scale) = match body.chars().last() {
        Some(last) if last.is_ascii_digit() => (body, 1.0),
        Some(last) => {
            let scale = prefix_scale(last).ok_or(FrameFaultKind::BadPrefix(last))?;
            (&body[..body.len() - last.len_utf8()], scale)
        },
        None => unreachable!(),
    };

    let mantissa = mantissa_str
        .parse::<i64>()
        .map_err(|_| FrameFaultKind::BadValue(line.to_owned()))?;

    Ok(TaggedVariable {
        tag: tag,
        value: mantissa as f64 * scale,
    })
}

/// Read the lines of one frame starting at `start` (the index of its `P`
/// marker) and produce a record carrying exactly the expected tags
///
/// Returns the index one past the frame's end marker along with the outcome.
fn parse_frame(
    lines: &[String],
    start: usize,
    tags: &[VarTag],
)
    -> (usize, Result<SampleRecord, FrameFault>)
{
    let mut vars = Vec::with_capacity(tags.len());
    let mut index = start + 1;

    while index < lines.len() {
        let line = lines[index].as_str();

        if line == FRAME_END {
            // a frame must carry every expected tag to be well formed
            for tag in tags {
                if !vars.iter().any(|var: &TaggedVariable| var.tag == *tag) {
                    return (
                        index + 1,
                        Err(FrameFault {
                            line_index: start,
                            kind: FrameFaultKind::MissingTag(*tag),
                        }),
                    );
                }
            }
            return (index + 1, Ok(SampleRecord::with_vars(vars)));
        }

        if line == FRAME_START {
            // a new frame began before this one ended
            return (
                index,
                Err(FrameFault {
                    line_index: start,
                    kind: FrameFaultKind::Truncated,
                }),
            );
        }

        if !line.is_empty() {
            // any line that breaks the frame's schema faults the whole frame;
            // records must carry exactly the expected tags, no more
            let outcome = parse_var(line).and_then(|var| {
                if !tags.contains(&var.tag) {
                    Err(FrameFaultKind::UnexpectedTag(var.tag))
                }
                else if vars.iter().any(|seen: &TaggedVariable| seen.tag == var.tag) {
                    Err(FrameFaultKind::DuplicateTag(var.tag))
                }
                else {
                    Ok(var)
                }
            });

            match outcome {
                Ok(var) => vars.push(var),
                Err(kind) => {
                    return (
                        skip_to_frame_end(lines, index + 1),
                        Err(FrameFault {
                            line_index: index,
                            kind: kind,
                        }),
                    );
                },
            }
        }

        index += 1;
    }

    (
        lines.len(),
        Err(FrameFault {
            line_index: start,
            kind: FrameFaultKind::Truncated,
        }),
    )
}

/// Find the resume point after a faulty frame: one past its end marker, or the
/// start of the next frame if the end marker never came
fn skip_to_frame_end(lines: &[String], mut index: usize) -> usize
{
    while index < lines.len() {
        if lines[index] == FRAME_END {
            return index + 1;
        }
        if lines[index] == FRAME_START {
            return index;
        }
        index += 1;
    }
    index
}

pub(crate) fn decode(
    response: &RawResponse,
    tags: &[VarTag],
    policy: DecodePolicy,
)
    -> Result<Decoded, DecodeError>
{
    let lines = response.lines();
    let mut decoded = Decoded::default();
    let mut index = 0;

    while index < lines.len() {
        if lines[index] != FRAME_START {
            // acknowledgement echoes and trailing blanks between frames
            index += 1;
            continue;
        }

        let (next, outcome) = parse_frame(lines, index, tags);
        match outcome {
            Ok(record) => decoded.records.push(record),
            Err(fault) => match policy {
                DecodePolicy::AbortOnFirst => return Err(fault.into()),
                DecodePolicy::CollectAndContinue => decoded.faults.push(fault),
            },
        }
        index = next;
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn cv_tags() -> Vec<VarTag>
    {
        vec![VarTag::Time, VarTag::Potential, VarTag::Current]
    }

    fn frame(lines: &[&str]) -> String
    {
        let mut text = String::from("P\n");
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str("*\n");
        text
    }

    #[test]
    fn well_formed_frames_decode_one_record_each()
    {
        let mut text = String::from("e\n");
        text.push_str(&frame(&["a100u", "p-200m", "c1530n"]));
        text.push_str(&frame(&["a200u", "p-199m", "c1610n"]));
        text.push_str(&frame(&["a300u", "p-198m", "c1705n"]));
        let response = RawResponse::from_text(&text);

        let decoded = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap();
        assert_eq!(decoded.records.len(), 3);
        assert!(decoded.faults.is_empty());

        let first = &decoded.records[0];
        assert!((first.time().unwrap() - 100e-6).abs() < 1e-12);
        assert!((first.potential().unwrap() + 0.2).abs() < 1e-9);
        assert!((first.current().unwrap() - 1.53e-6).abs() < 1e-12);
    }

    #[test]
    fn millivolt_value_scales_to_volts()
    {
        let response = RawResponse::from_text(&frame(&["a0u", "p200m", "c0n"]));
        let decoded = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap();

        let potential = decoded.records[0].potential().unwrap();
        assert!((potential - 0.2).abs() < 0.0005);
    }

    #[test]
    fn unprefixed_mantissa_scales_by_one()
    {
        let var = parse_var("a12").unwrap();
        assert_eq!(var.tag, VarTag::Time);
        assert_eq!(var.value, 12.0);
    }

    #[test]
    fn missing_tag_aborts_at_the_frame_start()
    {
        let mut text = frame(&["a100u", "p-200m", "c1530n"]);
        // second frame (starts at line 5) lacks the current channel
        text.push_str(&frame(&["a200u", "p-199m"]));
        let response = RawResponse::from_text(&text);

        let err = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MalformedFrame(FrameFault {
                line_index: 5,
                kind: FrameFaultKind::MissingTag(VarTag::Current),
            })
        );
    }

    #[test]
    fn collect_and_continue_keeps_the_good_frames()
    {
        let mut text = frame(&["a100u", "p-200m", "c1530n"]);
        text.push_str(&frame(&["a200u", "p-199m"]));
        text.push_str(&frame(&["a300u", "p-198m", "c1705n"]));
        let response = RawResponse::from_text(&text);

        let decoded = decode(&response, &cv_tags(), DecodePolicy::CollectAndContinue).unwrap();
        assert_eq!(decoded.records.len(), 2);
        assert_eq!(decoded.faults.len(), 1);
        assert_eq!(decoded.faults[0].line_index, 5);
    }

    #[test]
    fn unknown_tag_is_a_fault_at_the_offending_line()
    {
        let response = RawResponse::from_text(&frame(&["a100u", "x5m", "p-200m", "c1530n"]));
        let err = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap_err();

        assert_eq!(
            err,
            DecodeError::MalformedFrame(FrameFault {
                line_index: 2,
                kind: FrameFaultKind::UnknownTag('x'),
            })
        );
    }

    #[test]
    fn stray_second_channel_line_is_a_fault_in_a_single_channel_run()
    {
        // a stray `b` line parses as a valid tag but is not part of this
        // run's schema; letting it through would make the records non-uniform
        let mut text = frame(&["a100u", "p-200m", "c1530n"]);
        text.push_str(&frame(&["a200u", "p-199m", "c1610n", "b250n"]));
        let response = RawResponse::from_text(&text);

        let err = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MalformedFrame(FrameFault {
                line_index: 9,
                kind: FrameFaultKind::UnexpectedTag(VarTag::Second),
            })
        );

        let decoded = decode(&response, &cv_tags(), DecodePolicy::CollectAndContinue).unwrap();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.records[0].vars().len(), 3);
        assert_eq!(decoded.faults.len(), 1);
    }

    #[test]
    fn repeated_tag_within_a_frame_is_a_fault()
    {
        let response = RawResponse::from_text(&frame(&["a100u", "p-200m", "p-199m", "c1530n"]));
        let err = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap_err();

        assert_eq!(
            err,
            DecodeError::MalformedFrame(FrameFault {
                line_index: 3,
                kind: FrameFaultKind::DuplicateTag(VarTag::Potential),
            })
        );
    }

    #[test]
    fn truncated_final_frame_is_reported()
    {
        let mut text = frame(&["a100u", "p-200m", "c1530n"]);
        text.push_str("P\na200u\np-199m\n");
        let response = RawResponse::from_text(&text);

        let decoded = decode(&response, &cv_tags(), DecodePolicy::CollectAndContinue).unwrap();
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.faults[0].kind, FrameFaultKind::Truncated);
    }

    #[test]
    fn bad_mantissa_is_a_fault()
    {
        let response = RawResponse::from_text(&frame(&["a1x0u", "p-200m", "c1530n"]));
        let err = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap_err();

        match err {
            DecodeError::MalformedFrame(fault) => {
                assert_eq!(fault.line_index, 1);
                assert!(matches!(fault.kind, FrameFaultKind::BadPrefix('x') | FrameFaultKind::BadValue(_)));
            },
            other => panic!("expected MalformedFrame, got {:?}", other),
        }
    }

    #[test]
    fn empty_response_decodes_to_nothing()
    {
        let response = RawResponse::from_text("e\n\n");
        let decoded = decode(&response, &cv_tags(), DecodePolicy::AbortOnFirst).unwrap();
        assert!(decoded.records.is_empty());
    }
}
