/// Manifest format version with the platform's lenient gate comparison.
///
/// Gating compares the numeric `major.minor` prefix of both sides and falls
/// back to a plain string-prefix check for versions that do not parse, so
/// `"1.0.1"` gates like `1.0` and `"0.x"` passes no v1 gate. Feature gates
/// themselves are data (see the manifest crate's catalog), not conditional
/// code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestVersion {
    raw: String,
}

impl ManifestVersion {
    pub fn new(raw: impl Into<String>) -> Self {
        ManifestVersion { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this is any v1 manifest (gates the top-level key allowlist
    /// and the app/pages surface).
    pub fn is_v1(&self) -> bool {
        self.raw.starts_with('1')
    }

    /// `true` when this version satisfies the given `major.minor` gate.
    pub fn at_least(&self, gate: &str) -> bool {
        match (major_minor_value(&self.raw), major_minor_value(gate)) {
            (Some(version), Some(required)) => version >= required,
            _ => self.raw.starts_with(gate),
        }
    }
}

impl Default for ManifestVersion {
    fn default() -> Self {
        ManifestVersion::new("0.x")
    }
}

impl std::fmt::Display for ManifestVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn major_minor_value(version: &str) -> Option<f64> {
    let mut parts = version.split('.');
    let major = parts.next()?;
    let minor = parts.next()?;
    format!("{major}.{minor}").parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_compare_major_minor() {
        assert!(ManifestVersion::new("1.2").at_least("1.1"));
        assert!(ManifestVersion::new("1.3").at_least("1.3"));
        assert!(!ManifestVersion::new("1.0").at_least("1.1"));
        assert!(!ManifestVersion::new("0.x").at_least("1.1"));
    }

    #[test]
    fn patch_suffix_gates_like_its_minor() {
        assert!(ManifestVersion::new("1.2.7").at_least("1.2"));
        assert!(!ManifestVersion::new("1.0.1").at_least("1.1"));
    }

    #[test]
    fn unparsable_versions_fall_back_to_prefix() {
        assert!(ManifestVersion::new("1.x").at_least("1.x"));
        assert!(!ManifestVersion::new("1.x").at_least("1.1"));
    }

    #[test]
    fn v1_detection() {
        assert!(ManifestVersion::new("1.0").is_v1());
        assert!(!ManifestVersion::new("0.x").is_v1());
    }
}
