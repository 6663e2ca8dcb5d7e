use crate::component::Component;
use crate::config::Settings;
use crate::errors::{CeError, Result};
use crate::rules::RuleKey;
use glob::{MatchOptions, Pattern};
use tracing::debug;

pub const EXCLUSION_KEY: &str = "ce.issue.ignore.multicriteria";
pub const INCLUSION_KEY: &str = "ce.issue.enforce.multicriteria";

const PATH_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A (file path, rule key) pair of wildcard patterns.
#[derive(Debug, Clone)]
pub struct IssuePattern {
    component_pattern: Pattern,
    rule_pattern: Pattern,
}

impl IssuePattern {
    pub fn new(component_pattern: &str, rule_pattern: &str) -> Result<Self> {
        Ok(Self {
            component_pattern: Pattern::new(component_pattern)?,
            rule_pattern: Pattern::new(rule_pattern)?,
        })
    }

    pub fn match_component(&self, path: &str) -> bool {
        self.component_pattern.matches_with(path, PATH_MATCH)
    }

    pub fn match_rule(&self, rule_key: &RuleKey) -> bool {
        self.rule_pattern.matches(&rule_key.to_string())
    }

    pub fn component_pattern(&self) -> &str {
        self.component_pattern.as_str()
    }

    pub fn rule_pattern(&self) -> &str {
        self.rule_pattern.as_str()
    }
}

/// Accepts or rejects file issues according to the configured multicriteria
/// exclusion and inclusion patterns.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    exclusions: Vec<IssuePattern>,
    inclusions: Vec<IssuePattern>,
}

impl IssueFilter {
    pub fn new(exclusions: Vec<IssuePattern>, inclusions: Vec<IssuePattern>) -> Self {
        Self {
            exclusions,
            inclusions,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            load_patterns(settings, EXCLUSION_KEY)?,
            load_patterns(settings, INCLUSION_KEY)?,
        ))
    }

    pub fn accept(&self, rule_key: &RuleKey, component: &Component) -> bool {
        if !component.is_file() {
            return true;
        }
        let path = component.path.as_deref().unwrap_or(&component.key);
        !self.is_excluded(rule_key, path) && self.is_included(rule_key, path)
    }

    fn is_excluded(&self, rule_key: &RuleKey, path: &str) -> bool {
        match self
            .exclusions
            .iter()
            .find(|p| p.match_rule(rule_key) && p.match_component(path))
        {
            Some(pattern) => {
                debug!(
                    rule = %rule_key,
                    path,
                    component_pattern = pattern.component_pattern(),
                    rule_pattern = pattern.rule_pattern(),
                    "Issue excluded by pattern"
                );
                true
            }
            None => false,
        }
    }

    fn is_included(&self, rule_key: &RuleKey, path: &str) -> bool {
        let mut rule_matched = false;
        for pattern in self.inclusions.iter().filter(|p| p.match_rule(rule_key)) {
            if pattern.match_component(path) {
                return true;
            }
            rule_matched = true;
        }
        if rule_matched {
            debug!(rule = %rule_key, path, "Issue not included by any pattern");
        }
        !rule_matched
    }
}

fn load_patterns(settings: &Settings, prefix: &str) -> Result<Vec<IssuePattern>> {
    settings
        .get_strings(prefix)
        .iter()
        .map(|id| {
            let resource_key = format!("{}.{}.resourceKey", prefix, id);
            let rule_key = format!("{}.{}.ruleKey", prefix, id);
            let component = settings.get_string(&resource_key).ok_or_else(|| {
                CeError::config(format!("File path pattern cannot be empty: {}", resource_key))
            })?;
            let rule = settings.get_string(&rule_key).ok_or_else(|| {
                CeError::config(format!("Rule key pattern cannot be empty: {}", rule_key))
            })?;
            IssuePattern::new(component.trim(), rule.trim())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentTree, ComponentTreeBuilder, ComponentType};
    use crate::report::ReportComponent;
    use proptest::prelude::*;

    fn tree() -> ComponentTree {
        let components = vec![
            ReportComponent::new(1, ComponentType::Project, "P").with_children(&[2, 3]),
            ReportComponent::new(2, ComponentType::File, "A.java").with_path("src/main/A.java"),
            ReportComponent::new(3, ComponentType::File, "B.java").with_path("src/test/B.java"),
        ];
        ComponentTreeBuilder::new("proj").build(1, &components).unwrap()
    }

    fn rule(key: &str) -> RuleKey {
        key.parse().unwrap()
    }

    fn pattern(path: &str, rule: &str) -> IssuePattern {
        IssuePattern::new(path, rule).unwrap()
    }

    #[test]
    fn test_no_pattern_accepts_everything() {
        let tree = tree();
        let filter = IssueFilter::default();
        assert!(filter.accept(&rule("java:S1"), tree.get_by_ref(2).unwrap()));
    }

    #[test]
    fn test_exclusion_by_path_and_rule() {
        let tree = tree();
        let filter = IssueFilter::new(vec![pattern("src/test/**", "java:*")], vec![]);
        assert!(filter.accept(&rule("java:S1"), tree.get_by_ref(2).unwrap()));
        assert!(!filter.accept(&rule("java:S1"), tree.get_by_ref(3).unwrap()));
        assert!(filter.accept(&rule("js:S1"), tree.get_by_ref(3).unwrap()));
    }

    #[test]
    fn test_single_star_does_not_cross_directories() {
        let tree = tree();
        let filter = IssueFilter::new(vec![pattern("src/*.java", "*")], vec![]);
        assert!(filter.accept(&rule("java:S1"), tree.get_by_ref(2).unwrap()));
        let filter = IssueFilter::new(vec![pattern("src/*/?.java", "*")], vec![]);
        assert!(!filter.accept(&rule("java:S1"), tree.get_by_ref(2).unwrap()));
    }

    #[test]
    fn test_inclusion_rejects_other_paths_for_named_rule() {
        let tree = tree();
        let filter = IssueFilter::new(vec![], vec![pattern("src/main/**", "java:S1")]);
        assert!(filter.accept(&rule("java:S1"), tree.get_by_ref(2).unwrap()));
        assert!(!filter.accept(&rule("java:S1"), tree.get_by_ref(3).unwrap()));
    }

    #[test]
    fn test_inclusion_does_not_touch_unnamed_rules() {
        let tree = tree();
        let filter = IssueFilter::new(vec![], vec![pattern("src/main/**", "java:S1")]);
        assert!(filter.accept(&rule("java:S2"), tree.get_by_ref(3).unwrap()));
    }

    #[test]
    fn test_non_file_components_always_pass() {
        let tree = tree();
        let filter = IssueFilter::new(vec![pattern("**", "*")], vec![]);
        assert!(filter.accept(&rule("java:S1"), tree.root()));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        settings.set(EXCLUSION_KEY, "1,2");
        settings.set("ce.issue.ignore.multicriteria.1.resourceKey", "src/test/**");
        settings.set("ce.issue.ignore.multicriteria.1.ruleKey", "*");
        settings.set("ce.issue.ignore.multicriteria.2.resourceKey", "**/*.js");
        settings.set("ce.issue.ignore.multicriteria.2.ruleKey", "js:*");
        let filter = IssueFilter::from_settings(&settings).unwrap();
        let tree = tree();
        assert!(!filter.accept(&rule("java:S1"), tree.get_by_ref(3).unwrap()));
        assert!(filter.accept(&rule("java:S1"), tree.get_by_ref(2).unwrap()));
    }

    #[test]
    fn test_missing_pattern_part_is_a_configuration_error() {
        let mut settings = Settings::default();
        settings.set(INCLUSION_KEY, "1");
        settings.set("ce.issue.enforce.multicriteria.1.ruleKey", "*");
        let err = IssueFilter::from_settings(&settings).unwrap_err();
        assert!(matches!(err, CeError::Configuration(_)));
    }

    #[test]
    fn test_malformed_pattern_is_rejected() {
        assert!(IssuePattern::new("src/[", "*").is_err());
    }

    proptest! {
        #[test]
        fn prop_exclusion_wins_over_inclusion(
            rule_name in "S[0-9]{1,3}",
            include_all in any::<bool>(),
        ) {
            let tree = tree();
            let inclusions = if include_all {
                vec![pattern("**", "*")]
            } else {
                vec![pattern("other/**", "java:*")]
            };
            let filter = IssueFilter::new(vec![pattern("src/**", "java:*")], inclusions);
            let key = rule(&format!("java:{}", rule_name));
            prop_assert!(!filter.accept(&key, tree.get_by_ref(2).unwrap()));
            prop_assert!(!filter.accept(&key, tree.get_by_ref(3).unwrap()));
        }

        #[test]
        fn prop_inclusion_is_scoped_to_named_rules(rule_name in "[a-z]{1,8}") {
            let tree = tree();
            let filter = IssueFilter::new(vec![], vec![pattern("nowhere/**", "java:S1")]);
            let key = rule(&format!("js:{}", rule_name));
            prop_assert!(filter.accept(&key, tree.get_by_ref(2).unwrap()));
        }
    }
}
