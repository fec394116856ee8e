use crate::types::RunTimestamp;

/// Literal that separates the token label from the artifact kind.
const RISK_MARKER: &str = "_risk_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Text report (`.txt`).
    Report,
    /// Per-wallet table (`.csv`).
    Analysis,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "report",
            ArtifactKind::Analysis => "analysis",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactKind::Report => "txt",
            ArtifactKind::Analysis => "csv",
        }
    }

    fn parse_kind(s: &str) -> Option<Self> {
        match s {
            "report" => Some(ArtifactKind::Report),
            "analysis" => Some(ArtifactKind::Analysis),
            _ => None,
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parsed form of `<Token>_risk_<kind>_<YYYYMMDD_HHMMSS>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub token: String,
    pub timestamp: RunTimestamp,
    pub kind: ArtifactKind,
}

impl ArtifactName {
    pub fn new(token: impl Into<String>, timestamp: RunTimestamp, kind: ArtifactKind) -> Self {
        Self {
            token: token.into(),
            timestamp,
            kind,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}{RISK_MARKER}{}_{}.{}",
            self.token,
            self.kind,
            self.timestamp,
            self.kind.extension()
        )
    }

    /// Parse a bare filename. The token may contain underscores (even `_risk_`);
    /// the kind and timestamp are taken from the right.
    pub fn parse(file_name: &str) -> Option<Self> {
        let (stem, ext) = file_name.rsplit_once('.')?;

        // `_YYYYMMDD_HHMMSS` is a fixed 16 bytes at the end of the stem.
        let split = stem.len().checked_sub(15)?;
        let head = stem.get(..split)?.strip_suffix('_')?;
        let timestamp: RunTimestamp = stem.get(split..)?.parse().ok()?;

        let (token, kind) = head.rsplit_once(RISK_MARKER)?;
        let kind = ArtifactKind::parse_kind(kind)?;
        if token.is_empty() || ext != kind.extension() {
            return None;
        }

        Some(Self {
            token: token.to_string(),
            timestamp,
            kind,
        })
    }
}
