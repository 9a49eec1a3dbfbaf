//! Column table parsing for the macro dialect
//!
//! Macro-family instruments deliver results as a text table: free-form header
//! lines (technique name, column captions, blank separators) followed by one
//! comma-separated row of floating-point values per sample. Every line before
//! the first row that parses cleanly is header; after that, each row is
//! treated as one frame.
//!
//! The header boundary is purely syntactic: a header line that happens to
//! parse as exactly the expected number of floats (say, a numeric parameter
//! echo) would be taken as the first data row. The macro-family export
//! format captions every column before the data, so this does not occur in
//! practice; callers feeding hand-edited tables should strip the header
//! themselves.

use super::{
    DecodePolicy, Decoded, DecodeError, FrameFault, FrameFaultKind, RawResponse, SampleRecord,
    TaggedVariable, VarTag,
};

/// Parse one data row into a record, mapping columns onto `tags` in order
fn parse_row(line: &str, tags: &[VarTag]) -> Result<SampleRecord, FrameFaultKind>
{
    let mut vars = Vec::with_capacity(tags.len());
    let mut columns = 0;

    for column in line.split(',') {
        let column = column.trim();
        if column.is_empty() {
            continue;
        }

        columns += 1;
        if columns > tags.len() {
            continue;
        }

        let value = column
            .parse::<f64>()
            .map_err(|_| FrameFaultKind::BadValue(column.to_owned()))?;

        vars.push(TaggedVariable {
            tag: tags[columns - 1],
            value: value,
        });
    }

    if columns != tags.len() {
        return Err(FrameFaultKind::ColumnCount {
            expected: tags.len(),
            found: columns,
        });
    }

    Ok(SampleRecord::with_vars(vars))
}

pub(crate) fn decode(
    response: &RawResponse,
    tags: &[VarTag],
    policy: DecodePolicy,
)
    -> Result<Decoded, DecodeError>
{
    let mut decoded = Decoded::default();
    let mut in_data = false;

    for (index, line) in response.lines().iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        match parse_row(line, tags) {
            Ok(record) => {
                in_data = true;
                decoded.records.push(record);
            },
            Err(kind) => {
                // before the first data row this is just header text
                if !in_data {
                    continue;
                }

                let fault = FrameFault {
                    line_index: index,
                    kind: kind,
                };
                match policy {
                    DecodePolicy::AbortOnFirst => return Err(fault.into()),
                    DecodePolicy::CollectAndContinue => decoded.faults.push(fault),
                }
            },
        }
    }

    Ok(decoded)
}
