use std::{collections::HashSet, fs, path::PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;

use super::{PolicyCatalog, PolicyRule};

/// Loads the policy catalog from `policies.json` under a base directory,
/// validating entries and caching the parsed result.
pub struct FilePolicyCatalog {
    base_path: PathBuf,
    cache: OnceCell<Vec<PolicyRule>>,
}

impl FilePolicyCatalog {
    /// Create a catalog rooted at the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            cache: OnceCell::new(),
        }
    }

    fn catalog_path(&self) -> PathBuf {
        self.base_path.join("policies.json")
    }

    fn load_from_disk(&self) -> Result<Vec<PolicyRule>> {
        let path = self.catalog_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read policy catalog at {}", path.display()))?;
        let rules: Vec<PolicyRule> = serde_json::from_str(&raw).with_context(|| {
            format!("invalid JSON structure in policy catalog at {}", path.display())
        })?;

        let mut seen = HashSet::new();
        for rule in &rules {
            rule.validate()
                .with_context(|| format!("invalid catalog entry in {}", path.display()))?;
            if !seen.insert(rule.id.clone()) {
                return Err(anyhow::anyhow!("duplicate rule id `{}`", rule.id));
            }
        }
        Ok(rules)
    }
}

#[async_trait::async_trait]
impl PolicyCatalog for FilePolicyCatalog {
    async fn load_rules(&self) -> Result<Vec<PolicyRule>> {
        let rules = self.cache.get_or_try_init(|| self.load_from_disk())?;
        Ok(rules.clone())
    }

    async fn get_rule(&self, rule_id: &str) -> Result<Option<PolicyRule>> {
        let rules = self.load_rules().await?;
        Ok(rules.into_iter().find(|rule| rule.id == rule_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Platform, ProductCategory};
    use crate::policy::select_rules;
    use serde_json::json;
    use std::path::Path;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn sample_catalog_json() -> String {
        json!([
            {
                "id": "CLAIM_GUARANTEED_CURE",
                "category": "Misleading Claims",
                "type": "prohibited_claim",
                "severity": "critical",
                "keywords": ["cure", "guaranteed results", "miracle"],
                "description": "Promises a cure or guaranteed outcome",
                "policyReference": "Policy 1.1 – Unsubstantiated Claims",
                "suggestedAlternative": "may help support",
                "platforms": "all",
                "productCategories": "all"
            },
            {
                "id": "DISC_RESULTS_VARY",
                "category": "Required Disclaimers",
                "type": "required_disclaimer",
                "severity": "warning",
                "keywords": ["results may vary", "individual results"],
                "description": "Outcome claims need a results-vary disclaimer",
                "policyReference": "Policy 2.2 – Outcome Disclaimers",
                "platforms": ["meta", "google"],
                "productCategories": ["weight_loss", "supplements"]
            }
        ])
        .to_string()
    }

    #[test]
    fn loads_and_caches_catalog() {
        let temp = tempfile::tempdir().unwrap();
        write(&temp.path().join("policies.json"), &sample_catalog_json());

        let catalog = FilePolicyCatalog::new(temp.path());
        let rules = futures::executor::block_on(catalog.load_rules()).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, "CLAIM_GUARANTEED_CURE");

        // Second load served from cache even if the file disappears.
        fs::remove_file(temp.path().join("policies.json")).unwrap();
        let again = futures::executor::block_on(catalog.load_rules()).unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn missing_file_yields_empty_catalog() {
        let temp = tempfile::tempdir().unwrap();
        let catalog = FilePolicyCatalog::new(temp.path());
        let rules = futures::executor::block_on(catalog.load_rules()).unwrap();
        assert!(rules.is_empty());
    }

    #[test]
    fn duplicate_ids_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut parsed: Vec<serde_json::Value> =
            serde_json::from_str(&sample_catalog_json()).unwrap();
        let clone = parsed[0].clone();
        parsed.push(clone);
        write(
            &temp.path().join("policies.json"),
            &serde_json::to_string(&parsed).unwrap(),
        );

        let catalog = FilePolicyCatalog::new(temp.path());
        let err = futures::executor::block_on(catalog.load_rules()).unwrap_err();
        assert!(err
            .to_string()
            .contains("duplicate rule id `CLAIM_GUARANTEED_CURE`"));
    }

    #[test]
    fn get_rule_finds_by_id() {
        let temp = tempfile::tempdir().unwrap();
        write(&temp.path().join("policies.json"), &sample_catalog_json());
        let catalog = FilePolicyCatalog::new(temp.path());
        let rule = futures::executor::block_on(catalog.get_rule("DISC_RESULTS_VARY"))
            .unwrap()
            .expect("rule should exist");
        assert_eq!(rule.category, "Required Disclaimers");
        assert!(
            futures::executor::block_on(catalog.get_rule("NOPE"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn selection_over_loaded_catalog_matches_filters() {
        let temp = tempfile::tempdir().unwrap();
        write(&temp.path().join("policies.json"), &sample_catalog_json());
        let catalog = FilePolicyCatalog::new(temp.path());
        let rules = futures::executor::block_on(catalog.load_rules()).unwrap();

        let selected = select_rules(&rules, Platform::Google, &ProductCategory::WeightLoss);
        assert_eq!(selected.len(), 2);
        let selected = select_rules(&rules, Platform::Tiktok, &ProductCategory::WeightLoss);
        let ids: Vec<_> = selected.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["CLAIM_GUARANTEED_CURE"]);
    }

    #[test]
    fn loads_shipped_policy_pack() {
        let pack = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../policies")
            .canonicalize()
            .expect("policies directory should exist");
        let catalog = FilePolicyCatalog::new(pack);
        let rules = futures::executor::block_on(catalog.load_rules())
            .expect("shipped policy pack should parse");
        assert!(
            rules.iter().any(|rule| rule.id == "CLAIM_GUARANTEED_CURE"),
            "policies.json should provide CLAIM_GUARANTEED_CURE"
        );
        assert!(
            rules.iter().any(|rule| rule.id == "DISC_CONSULT_PROVIDER"),
            "policies.json should provide DISC_CONSULT_PROVIDER"
        );
    }
}
