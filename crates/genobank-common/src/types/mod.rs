//! Common types used across Genobank

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::GenobankError;

/// Textual encoding of a genotype matrix file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixFormat {
    /// Proprietary tab-delimited flat format, one accession per data row
    Flat,
    /// Community Hapmap format, one marker per data row
    Hapmap,
}

impl MatrixFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatrixFormat::Flat => "flat",
            MatrixFormat::Hapmap => "hapmap",
        }
    }

    /// Guess the format from a file name.
    ///
    /// `*.hmp.txt`, `*.hmp`, `*.hapmap` (optionally followed by `.gz`) are
    /// Hapmap; everything else is treated as the flat format.
    pub fn detect(path: impl AsRef<Path>) -> Self {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let name = name.strip_suffix(".gz").unwrap_or(&name);

        if name.ends_with(".hmp.txt") || name.ends_with(".hmp") || name.ends_with(".hapmap") {
            MatrixFormat::Hapmap
        } else {
            MatrixFormat::Flat
        }
    }

    /// Orientation in which data rows appear in files of this format
    pub fn native_orientation(&self) -> Orientation {
        match self {
            MatrixFormat::Flat => Orientation::AccessionMajor,
            MatrixFormat::Hapmap => Orientation::MarkerMajor,
        }
    }
}

impl std::str::FromStr for MatrixFormat {
    type Err = GenobankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flat" | "genotype" => Ok(MatrixFormat::Flat),
            "hapmap" | "hmp" => Ok(MatrixFormat::Hapmap),
            _ => Err(GenobankError::UnknownFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for MatrixFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row-major orientation of a materialized matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// One row per accession, one column per marker
    AccessionMajor,
    /// One row per marker, one column per accession
    MarkerMajor,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::AccessionMajor => "accession",
            Orientation::MarkerMajor => "marker",
        }
    }

    pub fn transposed(&self) -> Self {
        match self {
            Orientation::AccessionMajor => Orientation::MarkerMajor,
            Orientation::MarkerMajor => Orientation::AccessionMajor,
        }
    }
}

impl std::str::FromStr for Orientation {
    type Err = GenobankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accession" | "accession_major" | "sample" => Ok(Orientation::AccessionMajor),
            "marker" | "marker_major" => Ok(Orientation::MarkerMajor),
            _ => Err(GenobankError::UnknownOrientation(s.to_string())),
        }
    }
}

impl std::fmt::Display for Orientation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of entity a dataset member row points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Marker,
    Accession,
}

impl MemberKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberKind::Marker => "marker",
            MemberKind::Accession => "accession",
        }
    }
}

impl std::str::FromStr for MemberKind {
    type Err = GenobankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "marker" => Ok(MemberKind::Marker),
            "accession" | "germplasm" => Ok(MemberKind::Accession),
            _ => Err(GenobankError::UnknownMemberKind(s.to_string())),
        }
    }
}

impl std::fmt::Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(MatrixFormat::detect("panel.hmp.txt"), MatrixFormat::Hapmap);
        assert_eq!(MatrixFormat::detect("/data/panel.HMP.txt.gz"), MatrixFormat::Hapmap);
        assert_eq!(MatrixFormat::detect("panel.hapmap"), MatrixFormat::Hapmap);
        assert_eq!(MatrixFormat::detect("panel.txt"), MatrixFormat::Flat);
        assert_eq!(MatrixFormat::detect("panel.genotype.gz"), MatrixFormat::Flat);
    }

    #[test]
    fn test_native_orientation() {
        assert_eq!(MatrixFormat::Flat.native_orientation(), Orientation::AccessionMajor);
        assert_eq!(MatrixFormat::Hapmap.native_orientation(), Orientation::MarkerMajor);
        assert_eq!(
            Orientation::AccessionMajor.transposed(),
            Orientation::MarkerMajor
        );
    }

    #[test]
    fn test_parse_vocabulary() {
        assert_eq!("HapMap".parse::<MatrixFormat>().unwrap(), MatrixFormat::Hapmap);
        assert!("vcf".parse::<MatrixFormat>().is_err());
        assert_eq!("marker".parse::<Orientation>().unwrap(), Orientation::MarkerMajor);
        assert_eq!("germplasm".parse::<MemberKind>().unwrap(), MemberKind::Accession);
    }
}
