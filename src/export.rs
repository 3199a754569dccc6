//! CSV export of the feedback table
//!
//! Columns are fixed: `id, question, description, name, votes, timestamp,
//! author_id, voter_ids`. Values are written exactly as stored. Quoting
//! follows RFC 4180: a field containing a comma, quote, CR or LF is wrapped
//! in double quotes with inner quotes doubled. Lines end with CRLF.

use crate::db::FeedbackRow;

pub const CSV_HEADER: [&str; 8] = [
    "id",
    "question",
    "description",
    "name",
    "votes",
    "timestamp",
    "author_id",
    "voter_ids",
];

/// Render rows as a UTF-8 CSV document
pub fn feedback_csv(rows: &[FeedbackRow]) -> String {
    let mut out = String::new();
    push_record(&mut out, CSV_HEADER.iter().copied());

    for row in rows {
        let id = row.id.to_string();
        let votes = row.votes.to_string();
        push_record(
            &mut out,
            [
                id.as_str(),
                row.question.as_str(),
                row.description.as_deref().unwrap_or(""),
                row.name.as_str(),
                votes.as_str(),
                row.timestamp.as_deref().unwrap_or(""),
                row.author_id.as_deref().unwrap_or(""),
                row.voter_ids.as_deref().unwrap_or(""),
            ],
        );
    }
    out
}

fn push_record<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> FeedbackRow {
        FeedbackRow {
            id: 3,
            question: "Add \"dark\" mode, please?".into(),
            description: Some("line one\nline two".into()),
            name: "Zoë".into(),
            votes: 2,
            timestamp: Some("2024-05-01 10:00:00.000".into()),
            author_id: Some("a1".into()),
            voter_ids: Some(r#"["a1","b1"]"#.into()),
            upvoter_data: Some("[]".into()),
        }
    }

    #[test]
    fn test_header_only() {
        assert_eq!(
            feedback_csv(&[]),
            "id,question,description,name,votes,timestamp,author_id,voter_ids\r\n"
        );
    }

    #[test]
    fn test_quoting() {
        let csv = feedback_csv(&[row()]);
        let line = csv.split("\r\n").nth(1).unwrap();
        assert_eq!(
            line,
            "3,\"Add \"\"dark\"\" mode, please?\",\"line one\nline two\",Zoë,2,2024-05-01 10:00:00.000,a1,\"[\"\"a1\"\",\"\"b1\"\"]\""
        );
    }

    #[test]
    fn test_missing_optionals_are_empty() {
        let mut r = row();
        r.description = None;
        r.author_id = None;
        r.question = "plain".into();
        r.voter_ids = None;
        let csv = feedback_csv(&[r]);
        assert!(csv.ends_with("3,plain,,Zoë,2,2024-05-01 10:00:00.000,,\r\n"));
    }
}
