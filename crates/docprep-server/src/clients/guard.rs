//! Guardrail parameter groups and scan verdicts
//!
//! Guard configuration is a set of per-scanner parameter groups. Each group
//! is one variant of [`ScannerParams`], so merging remote configuration over
//! the baseline is an explicit variant-by-variant operation instead of
//! string-keyed dict unpacking.

use serde::{Deserialize, Serialize};

use super::Doc;

/// Parameters for one guard scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scanner", rename_all = "snake_case")]
pub enum ScannerParams {
    Pii {
        enabled: bool,
        #[serde(default)]
        entities: Vec<String>,
    },
    Secrets {
        enabled: bool,
        #[serde(default)]
        redact: bool,
    },
    Toxicity {
        enabled: bool,
        #[serde(default)]
        threshold: f64,
    },
    BanTopics {
        enabled: bool,
        #[serde(default)]
        topics: Vec<String>,
        #[serde(default)]
        threshold: f64,
    },
}

impl ScannerParams {
    fn same_group(&self, other: &ScannerParams) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

/// Full guardrail configuration sent with a scan request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailParams {
    #[serde(default)]
    pub scanners: Vec<ScannerParams>,
}

impl GuardrailParams {
    /// Compiled-in scan policy used when the fingerprint service has nothing
    /// more specific: PII and secret detection on, nothing else.
    pub fn baseline() -> Self {
        Self {
            scanners: vec![
                ScannerParams::Pii {
                    enabled: true,
                    entities: Vec::new(),
                },
                ScannerParams::Secrets {
                    enabled: true,
                    redact: false,
                },
            ],
        }
    }

    /// Merge `overrides` over `self`: a group present in both is replaced by
    /// the override, a group only in `overrides` is appended, anything else
    /// is kept.
    pub fn merge(mut self, overrides: GuardrailParams) -> GuardrailParams {
        for incoming in overrides.scanners {
            match self
                .scanners
                .iter_mut()
                .find(|existing| existing.same_group(&incoming))
            {
                Some(existing) => *existing = incoming,
                None => self.scanners.push(incoming),
            }
        }
        self
    }
}

/// Outcome of a guard scan.
///
/// A policy block is a verdict, not a failure: the caller branches on the
/// variant instead of inspecting status codes.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardVerdict {
    Clean(Vec<Doc>),
    Blocked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_matching_group() {
        let merged = GuardrailParams::baseline().merge(GuardrailParams {
            scanners: vec![ScannerParams::Pii {
                enabled: false,
                entities: vec!["EMAIL".into()],
            }],
        });

        assert_eq!(merged.scanners.len(), 2);
        assert_eq!(
            merged.scanners[0],
            ScannerParams::Pii {
                enabled: false,
                entities: vec!["EMAIL".into()]
            }
        );
        // The untouched group survives.
        assert_eq!(
            merged.scanners[1],
            ScannerParams::Secrets {
                enabled: true,
                redact: false
            }
        );
    }

    #[test]
    fn test_merge_appends_new_group() {
        let merged = GuardrailParams::baseline().merge(GuardrailParams {
            scanners: vec![ScannerParams::Toxicity {
                enabled: true,
                threshold: 0.8,
            }],
        });

        assert_eq!(merged.scanners.len(), 3);
        assert!(matches!(
            merged.scanners[2],
            ScannerParams::Toxicity { enabled: true, .. }
        ));
    }

    #[test]
    fn test_merge_empty_overrides_is_identity() {
        let baseline = GuardrailParams::baseline();
        let merged = baseline.clone().merge(GuardrailParams::default());
        assert_eq!(merged, baseline);
    }

    #[test]
    fn test_params_serialize_with_scanner_tag() {
        let params = GuardrailParams {
            scanners: vec![ScannerParams::Secrets {
                enabled: true,
                redact: true,
            }],
        };
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["scanners"][0]["scanner"], "secrets");
        assert_eq!(json["scanners"][0]["redact"], true);
    }
}
