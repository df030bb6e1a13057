//! Rule registry: configuration key -> rule factory.

use std::collections::BTreeMap;

use crate::authenticity::AuthenticityRule;
use crate::chain::RuleChain;
use crate::config::GradingConfig;
use crate::error::CorrectionError;
use crate::formatting::{FormattingRule, VisibilityRule};
use crate::lookup::LookupFamilyRule;
use crate::print_setup::PrintSetupRule;
use crate::rule::Rule;
use crate::selection::SelectionRule;
use crate::values::ValuesRule;

pub type RuleFactory = fn(&GradingConfig) -> Box<dyn Rule>;

pub struct RuleRegistry {
    factories: BTreeMap<&'static str, RuleFactory>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuleRegistry {
    /// A registry without any rules.
    pub fn empty() -> Self {
        Self { factories: BTreeMap::new() }
    }

    /// All built-in rules.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register("authenticity", |c| Box::new(AuthenticityRule::new(c)));
        registry.register("formatting", |c| Box::new(FormattingRule::new(c)));
        registry.register("visibility", |c| Box::new(VisibilityRule::new(c)));
        registry.register("lookup_family", |c| Box::new(LookupFamilyRule::new(c)));
        registry.register("selection", |c| Box::new(SelectionRule::new(c)));
        registry.register("values", |c| Box::new(ValuesRule::new(c)));
        registry.register("print_setup", |c| Box::new(PrintSetupRule::new(c)));
        registry
    }

    /// Add or replace the factory for `key`.
    pub fn register(&mut self, key: &'static str, factory: RuleFactory) {
        self.factories.insert(key, factory);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn create(&self, key: &str, config: &GradingConfig) -> Result<Box<dyn Rule>, CorrectionError> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| CorrectionError::UnknownRule(key.to_string()))?;
        Ok(factory(config))
    }

    /// Instantiate the configured rules in order. An invalid configuration
    /// or an unknown name is rejected before any rule is built.
    pub fn build(&self, config: &GradingConfig) -> Result<RuleChain, CorrectionError> {
        config.validate()?;
        if let Some(unknown) = config.rules.iter().find(|name| !self.contains(name)) {
            return Err(CorrectionError::UnknownRule(unknown.clone()));
        }
        let rules = config
            .rules
            .iter()
            .map(|name| self.create(name, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RuleChain::new(rules, config.messages.structural_error.clone()))
    }
}
