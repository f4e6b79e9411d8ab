//! Segment arguments: `PATH` or `PATH:EXPECTED_BYTES`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where a segment's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentInput {
    Stdin,
    File(PathBuf),
}

/// One command-line segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentArg {
    pub input: SegmentInput,
    pub expected_bytes: Option<u64>,
}

impl FromStr for SegmentArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("segment cannot be empty".to_string());
        }

        // A trailing ":<digits>" is a budget; anything else is part of the path
        let (path, expected_bytes) = match s.rsplit_once(':') {
            Some((path, bytes))
                if !path.is_empty()
                    && !bytes.is_empty()
                    && bytes.bytes().all(|b| b.is_ascii_digit()) =>
            {
                let bytes = bytes
                    .parse::<u64>()
                    .map_err(|e| format!("invalid byte count in '{}': {}", s, e))?;
                (path, Some(bytes))
            }
            _ => (s, None),
        };

        let input = if path == "-" {
            SegmentInput::Stdin
        } else {
            SegmentInput::File(PathBuf::from(path))
        };
        Ok(Self {
            input,
            expected_bytes,
        })
    }
}

impl fmt::Display for SegmentArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.input {
            SegmentInput::Stdin => f.write_str("<stdin>")?,
            SegmentInput::File(path) => write!(f, "{}", path.display())?,
        }
        if let Some(bytes) = self.expected_bytes {
            write!(f, " ({} bytes)", bytes)?;
        }
        Ok(())
    }
}
