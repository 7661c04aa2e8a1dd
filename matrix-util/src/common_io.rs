use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Field separator: any of several characters, or a whole string
pub enum Delimiter {
    Str(String),
    Chars(Vec<char>),
}

impl From<&str> for Delimiter {
    fn from(s: &str) -> Self {
        Delimiter::Str(s.to_string())
    }
}

impl From<&[char]> for Delimiter {
    fn from(chars: &[char]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl<const N: usize> From<&[char; N]> for Delimiter {
    fn from(chars: &[char; N]) -> Self {
        Delimiter::Chars(chars.to_vec())
    }
}

impl Delimiter {
    /// Trimmed fields of `line`
    fn words(&self, line: &str) -> Vec<Box<str>> {
        let trimmed = |w: &str| -> Box<str> { w.trim().into() };
        match self {
            Delimiter::Str(s) => line.split(s.as_str()).map(trimmed).collect(),
            Delimiter::Chars(chars) => line.split(chars.as_slice()).map(trimmed).collect(),
        }
    }
}

fn is_gzipped(file: &str) -> bool {
    Path::new(file).extension().is_some_and(|x| x == "gz")
}

/// Buffered reader, decompressing `.gz` files
pub fn open_buf_reader(input_file: &str) -> anyhow::Result<Box<dyn BufRead>> {
    let file = File::open(input_file)
        .map_err(|e| anyhow::anyhow!("cannot open {}: {}", input_file, e))?;
    if is_gzipped(input_file) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Buffered writer, compressing `.gz` files
pub fn open_buf_writer(output_file: &str) -> anyhow::Result<Box<dyn Write>> {
    let file = File::create(output_file)
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", output_file, e))?;
    if is_gzipped(output_file) {
        let encoder = GzEncoder::new(file, flate2::Compression::default());
        Ok(Box::new(BufWriter::new(encoder)))
    } else {
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Write one line per item (gzipped if the name ends with `.gz`)
pub fn write_lines<T>(lines: &[T], output_file: &str) -> anyhow::Result<()>
where
    T: std::fmt::Display,
{
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        writeln!(buf, "{}", line)?;
    }
    buf.flush()?;
    Ok(())
}

pub struct ReadLinesOut {
    pub header: Vec<Box<str>>,
    pub lines: Vec<Vec<Box<str>>>,
}

/// Read a delimited text file, gzipped or not
///
/// Empty lines and comment lines starting with `#` or `%` are skipped
/// before counting lines.
///
/// * `input_file` - file name
/// * `delim` - field separator
/// * `hdr_line` - index of the header line among the remaining lines
///   (`None` = no header); lines before it are dropped
pub fn read_lines_of_words_delim(
    input_file: &str,
    delim: impl Into<Delimiter>,
    hdr_line: Option<usize>,
) -> anyhow::Result<ReadLinesOut> {
    let delim = delim.into();

    let raw: Vec<String> = open_buf_reader(input_file)?
        .lines()
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .filter(|x| !(x.starts_with('#') || x.starts_with('%') || x.trim().is_empty()))
        .collect();

    let (header, body) = match hdr_line {
        Some(h) if h >= raw.len() => {
            return Err(anyhow::anyhow!(
                "{}: no header at line {} of {}",
                input_file,
                h,
                raw.len()
            ));
        }
        Some(h) => (delim.words(&raw[h]), &raw[(h + 1)..]),
        None => (vec![], &raw[..]),
    };

    let lines = body.par_iter().map(|x| delim.words(x)).collect();
    Ok(ReadLinesOut { header, lines })
}

/// Create the parent directory of `file` if it does not exist
pub fn ensure_parent_dir(file: &str) -> anyhow::Result<()> {
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(std::fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}

/// Format of a file by its extension, ignoring a trailing `.gz`
///
/// `data.tsv.gz` gives `tsv`, `data.parquet` gives `parquet`
pub fn file_ext(file_path: &str) -> anyhow::Result<Box<str>> {
    let path = Path::new(file_path);
    let path = if is_gzipped(file_path) {
        path.file_stem().map(Path::new).filter(|p| p.extension().is_some())
    } else {
        Some(path)
    };

    path.and_then(|p| p.extension())
        .or_else(|| Path::new(file_path).extension())
        .and_then(|x| x.to_str())
        .map(Box::from)
        .ok_or_else(|| anyhow::anyhow!("no extension: {}", file_path))
}

/// Path of a not-yet-existing file inside a fresh temporary
/// directory
pub fn create_temp_dir_file(suffix: &str) -> anyhow::Result<PathBuf> {
    // the directory is removed with its guard and made again to outlive it
    let dir = tempfile::Builder::new()
        .prefix("matrix-util")
        .tempdir()?
        .path()
        .to_path_buf();
    std::fs::create_dir_all(&dir)?;

    let file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile_in(&dir)?
        .into_temp_path();
    Ok(file.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_ext_looks_through_gz() -> anyhow::Result<()> {
        assert_eq!(file_ext("a/b/data.tsv.gz")?.as_ref(), "tsv");
        assert_eq!(file_ext("data.parquet")?.as_ref(), "parquet");
        assert_eq!(file_ext("data.gz")?.as_ref(), "gz");
        assert!(file_ext("noext").is_err());
        Ok(())
    }

    #[test]
    fn gzip_lines_round_trip() -> anyhow::Result<()> {
        let file = create_temp_dir_file(".txt.gz")?;
        let file = file.to_str().unwrap();
        ensure_parent_dir(file)?;

        let lines = vec!["# comment", "", "a,b,c", "1,2,3", "4, 5 ,6"];
        write_lines(&lines, file)?;

        let out = read_lines_of_words_delim(file, ",", Some(0))?;
        assert_eq!(out.header.len(), 3);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.lines[1][1].as_ref(), "5");

        let out = read_lines_of_words_delim(file, &[','], None)?;
        assert_eq!(out.lines.len(), 3);
        assert!(read_lines_of_words_delim(file, ",", Some(3)).is_err());
        Ok(())
    }
}
