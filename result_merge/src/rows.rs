//! Serialization of response rows into `LOAD DATA` input.

use bytes::Bytes;
use wire_types::{JobIdAttempt, ResultPayload};

// MySQL LOAD DATA default separators: tab between fields, newline between
// rows, backslash escapes, \N for NULL.
fn push_escaped(out: &mut Vec<u8>, cell: &[u8]) {
    for &b in cell {
        match b {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\t' => out.extend_from_slice(b"\\\t"),
            b'\n' => out.extend_from_slice(b"\\\n"),
            other => out.push(other),
        }
    }
}

/// Render the payload's rows as tab-separated text, each row prefixed
/// with the job-attempt tag column.
pub(crate) fn serialize_rows(payload: &ResultPayload, tag: JobIdAttempt) -> Bytes {
    let mut out = Vec::with_capacity(payload.rows.len() * 32);
    let tag = tag.value().to_string();
    for row in &payload.rows {
        out.extend_from_slice(tag.as_bytes());
        for cell in &row.cells {
            out.push(b'\t');
            if cell.null {
                out.extend_from_slice(b"\\N");
            } else {
                push_escaped(&mut out, &cell.value);
            }
        }
        out.push(b'\n');
    }
    out.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wire_types::{Cell, Row};

    fn payload(rows: Vec<Row>) -> ResultPayload {
        ResultPayload {
            rows,
            ..Default::default()
        }
    }

    fn cell(value: &[u8]) -> Cell {
        Cell {
            null: false,
            value: value.to_vec(),
        }
    }

    #[test]
    fn rows_are_tagged_and_tab_separated() {
        let tag = JobIdAttempt::try_new(3, 1).unwrap(); // 16
        let data = serialize_rows(
            &payload(vec![
                Row {
                    cells: vec![cell(b"100"), cell(b"abc")],
                },
                Row {
                    cells: vec![
                        cell(b"101"),
                        Cell {
                            null: true,
                            value: vec![],
                        },
                    ],
                },
            ]),
            tag,
        );
        assert_eq!(&data[..], b"16\t100\tabc\n16\t101\t\\N\n");
    }

    #[test]
    fn special_bytes_are_escaped() {
        let tag = JobIdAttempt::try_new(0, 0).unwrap();
        let data = serialize_rows(
            &payload(vec![Row {
                cells: vec![cell(b"a\tb\nc\\d")],
            }]),
            tag,
        );
        assert_eq!(&data[..], b"0\ta\\\tb\\\nc\\\\d\n");
    }
}
