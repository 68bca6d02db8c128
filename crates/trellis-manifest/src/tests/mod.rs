mod blocks;
mod migration;
mod v1;

use trellis_core::Issue;

pub(crate) fn has_code(issues: &[Issue], code: &str) -> bool {
    issues.iter().any(|issue| issue.code == code)
}
