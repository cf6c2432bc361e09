//! CSV and raw HTML output.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use csv::{Terminator, WriterBuilder};

/// Create `path` (and its parents) and write the header plus every row.
///
/// Fields are quoted only when they contain a delimiter, a quote or a line
/// break; rows end in CRLF.
pub fn write_csv<I>(path: &Path, header: &[&str], rows: I) -> Result<usize, csv::Error>
where
    I: IntoIterator<Item = Vec<String>>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::CRLF)
        .from_path(path)?;
    writer.write_record(header)?;

    let mut written = 0;
    for row in rows {
        writer.write_record(&row)?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Store the HTML of one page as `<dir>/<key>.html`.
pub fn write_snapshot(dir: &Path, key: &str, html: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.html", sanitize_key(key)));
    fs::write(&path, html)?;
    Ok(path)
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        let rows = vec![
            vec!["a".to_string(), "b c".to_string(), String::new()],
            vec![
                "Smith, John".to_string(),
                "say \"hi\"".to_string(),
                "two\nlines".to_string(),
            ],
        ];
        let written = write_csv(&path, &["x", "y", "z"], rows).unwrap();
        assert_eq!(written, 2);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "x,y,z\r\na,b c,\r\n\"Smith, John\",\"say \"\"hi\"\"\",\"two\nlines\"\r\n"
        );
    }

    #[test]
    fn header_is_written_without_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed").join("empty.csv");
        let written = write_csv(&path, &["player_id", "player_name"], Vec::new()).unwrap();
        assert_eq!(written, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "player_id,player_name\r\n");
    }

    #[test]
    fn snapshot_keys_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_snapshot(dir.path(), "../sfo", "<html></html>").unwrap();
        assert_eq!(path, dir.path().join("___sfo.html"));
        assert_eq!(fs::read_to_string(path).unwrap(), "<html></html>");
    }
}
