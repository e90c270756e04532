// Integrity Verification
//
// Compares local log lines against digests retrieved from the ledger.
// A mismatch is a finding in the report, not an error.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of one line.
pub fn digest_hex(line: &str) -> String {
    hex::encode(Sha256::digest(line.as_bytes()))
}

/// Split on `\n`, dropping the empty element left by a trailing newline.
pub fn split_lines(text: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// Content of a hash file: one digest per line of `text`.
pub fn hash_lines(text: &str) -> Vec<String> {
    split_lines(text).into_iter().map(digest_hex).collect()
}

pub fn verify_line(line: &str, digest: impl AsRef<[u8]>) -> bool {
    digest_hex(line).as_bytes() == digest.as_ref()
}

/// A local line whose digest differs from the retrieved one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Zero-based position in both sequences.
    pub position: usize,
    /// Digest retrieved from the ledger.
    pub expected: String,
    /// Digest of the local line.
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct VerificationReport {
    pub compared: usize,
    pub matched: usize,
    pub mismatches: Vec<Mismatch>,
    /// Local lines with no retrieved digest.
    pub missing_digests: usize,
    /// Retrieved digests with no local line.
    pub extra_digests: usize,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.missing_digests == 0 && self.extra_digests == 0
    }

    pub fn mismatched_positions(&self) -> Vec<usize> {
        self.mismatches.iter().map(|m| m.position).collect()
    }
}

/// Compare `local[i]` against `digests[i]` for every common position.
pub fn verify_records<L, D>(local: &[L], digests: &[D]) -> VerificationReport
where
    L: AsRef<str>,
    D: AsRef<[u8]>,
{
    let mut report = VerificationReport::default();

    for (position, (line, digest)) in local.iter().zip(digests).enumerate() {
        let actual = digest_hex(line.as_ref());
        report.compared += 1;

        if actual.as_bytes() == digest.as_ref() {
            report.matched += 1;
        } else {
            report.mismatches.push(Mismatch {
                position,
                expected: String::from_utf8_lossy(digest.as_ref()).into_owned(),
                actual,
            });
        }
    }

    report.missing_digests = local.len().saturating_sub(digests.len());
    report.extra_digests = digests.len().saturating_sub(local.len());
    report
}

/// `verify_records` over raw text, as read from a log file.
pub fn verify_text<D: AsRef<[u8]>>(text: &str, digests: &[D]) -> VerificationReport {
    verify_records(&split_lines(text), digests)
}
