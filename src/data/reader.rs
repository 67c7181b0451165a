//! Stream parser for the line-oriented movie review file.
//!
//! One logical record per blank-line-delimited block of `Key: Value` lines.
//! Lines without a `": "` separator are continuations of the review text.
//! Invalid UTF-8 is replaced lossily.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use super::record::RawRecord;

pub fn read_reviews_file(path: &Path, max_records: usize) -> io::Result<Vec<RawRecord>> {
    let file = File::open(path)?;
    read_reviews(BufReader::new(file), max_records)
}

pub fn read_reviews<R: BufRead>(mut reader: R, max_records: usize) -> io::Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    let mut record = RawRecord::new();
    let mut buf = Vec::new();

    loop {
        if records.len() >= max_records {
            break;
        }
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();

        if line.is_empty() {
            if !record.is_empty() {
                records.push(std::mem::take(&mut record));
            }
            continue;
        }

        match line.split_once(": ") {
            Some((key, value)) => record.insert(key, value),
            None => record.append_review_text(line),
        }
    }

    if !record.is_empty() && records.len() < max_records {
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
product/productId: B001
review/userId: U1
review/score: 5.0
review/text: First line
continues here

product/productId: B002
review/userId: U2
review/score: 2.0
review/text: Second record
";

    #[test]
    fn splits_blocks_on_blank_lines() {
        let records = read_reviews(Cursor::new(SAMPLE), usize::MAX).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("product/productId"), Some("B001"));
        assert_eq!(records[1].get("product/productId"), Some("B002"));
    }

    #[test]
    fn appends_continuation_lines_to_review_text() {
        let records = read_reviews(Cursor::new(SAMPLE), usize::MAX).unwrap();
        assert_eq!(records[0].get("review/text"), Some("First line continues here"));
    }

    #[test]
    fn yields_trailing_record_without_final_blank_line() {
        let records = read_reviews(Cursor::new(SAMPLE), usize::MAX).unwrap();
        assert_eq!(records[1].get("review/text"), Some("Second record"));
    }

    #[test]
    fn caps_at_max_records() {
        let records = read_reviews(Cursor::new(SAMPLE), 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("review/userId"), Some("U1"));
    }

    #[test]
    fn value_may_itself_contain_separator() {
        let input = "review/summary: good: actually great\n";
        let records = read_reviews(Cursor::new(input), usize::MAX).unwrap();
        assert_eq!(records[0].get("review/summary"), Some("good: actually great"));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut input = b"review/userId: U1\nreview/text: bad ".to_vec();
        input.extend_from_slice(&[0xff, 0xfe]);
        input.extend_from_slice(b" bytes\n");
        let records = read_reviews(Cursor::new(input), usize::MAX).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].get("review/text").unwrap().contains("bytes"));
    }
}
