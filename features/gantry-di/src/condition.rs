//! Conditions deciding whether a registered bean takes part in the container
//!
//! Conditions are evaluated once, while the container resolves its beans. They
//! may look at properties and ask which beans exist, but never cause wiring.

use std::sync::Arc;

use gantry_config::Properties;

use crate::{definition::BeanInfo, errors::ContainerError, selector::Selector};

/// Property listing the active profiles, comma separated
pub const ACTIVE_PROFILES: &str = "gantry.profiles.active";

/// Read only view of the container while conditions are evaluated
pub trait ConditionContext {
    fn properties(&self) -> &Properties;

    /// The live beans matching the selector
    fn find(&mut self, selector: &Selector) -> Result<Vec<BeanInfo>, ContainerError>;

    /// The resolved text of a property, None if absent
    fn property(&self, key: &str) -> Result<Option<String>, ContainerError> {
        let properties = self.properties();
        if !properties.contains(key) {
            return Ok(None);
        }
        Ok(Some(properties.resolve(&format!("${{{}}}", key.to_lowercase()))?))
    }

    fn has_property(&self, key: &str) -> bool {
        self.properties().has(key)
    }

    fn profiles(&self) -> Result<Vec<String>, ContainerError> {
        Ok(self
            .property(ACTIVE_PROFILES)?
            .map(|active| {
                active
                    .split(',')
                    .map(str::trim)
                    .filter(|profile| !profile.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// A predicate over the container state
pub trait Condition: Send + Sync + 'static {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError>;
}

impl Condition for Arc<dyn Condition> {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        self.as_ref().matches(ctx)
    }
}

/// Boolean composition of conditions
pub trait ConditionExt: Condition + Sized {
    fn and(self, other: impl Condition) -> All {
        All(vec![Arc::new(self), Arc::new(other)])
    }

    fn or(self, other: impl Condition) -> Any {
        Any(vec![Arc::new(self), Arc::new(other)])
    }
}
impl<C: Condition> ConditionExt for C {}

/// Matches if the property exists, optionally with a given value
#[derive(Debug, Clone)]
pub struct OnProperty {
    key: String,
    having: Option<String>,
    if_missing: bool,
}

pub fn on_property(key: impl Into<String>) -> OnProperty {
    OnProperty {
        key: key.into(),
        having: None,
        if_missing: false,
    }
}

impl OnProperty {
    /// Requires the resolved text to equal `value`
    pub fn having_value(mut self, value: impl Into<String>) -> Self {
        self.having = Some(value.into());
        self
    }

    /// Matches when the property does not exist
    pub fn match_if_missing(mut self) -> Self {
        self.if_missing = true;
        self
    }
}

impl Condition for OnProperty {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        if !ctx.has_property(&self.key) {
            return Ok(self.if_missing);
        }
        let Some(expected) = &self.having else {
            return Ok(true);
        };
        Ok(ctx.property(&self.key)?.as_deref() == Some(expected.as_str()))
    }
}

/// Matches if the property does not exist
#[derive(Debug, Clone)]
pub struct OnMissingProperty(String);

pub fn on_missing_property(key: impl Into<String>) -> OnMissingProperty {
    OnMissingProperty(key.into())
}

impl Condition for OnMissingProperty {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        Ok(!ctx.has_property(&self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Any,
    None,
    Single,
}

/// Matches on the number of beans a selector finds
#[derive(Debug, Clone)]
pub struct OnBean {
    selector: Selector,
    presence: Presence,
}

/// Matches if at least one bean matches the selector
pub fn on_bean(selector: impl Into<Selector>) -> OnBean {
    OnBean {
        selector: selector.into(),
        presence: Presence::Any,
    }
}

/// Matches if no bean matches the selector
pub fn on_missing_bean(selector: impl Into<Selector>) -> OnBean {
    OnBean {
        selector: selector.into(),
        presence: Presence::None,
    }
}

/// Matches if exactly one bean matches the selector
pub fn on_single_bean(selector: impl Into<Selector>) -> OnBean {
    OnBean {
        selector: selector.into(),
        presence: Presence::Single,
    }
}

impl Condition for OnBean {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        let found = ctx.find(&self.selector)?.len();
        Ok(match self.presence {
            Presence::Any => found > 0,
            Presence::None => found == 0,
            Presence::Single => found == 1,
        })
    }
}

/// Matches if the profile is active
#[derive(Debug, Clone)]
pub struct OnProfile(String);

pub fn on_profile(profile: impl Into<String>) -> OnProfile {
    OnProfile(profile.into())
}

impl Condition for OnProfile {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        Ok(ctx.profiles()?.iter().any(|profile| *profile == self.0))
    }
}

/// Matches if the function returns true
pub struct OnMatches<F>(F);

pub fn on_matches<F>(matches: F) -> OnMatches<F>
where
    F: Fn(&mut dyn ConditionContext) -> Result<bool, ContainerError> + Send + Sync + 'static,
{
    OnMatches(matches)
}

impl<F> Condition for OnMatches<F>
where
    F: Fn(&mut dyn ConditionContext) -> Result<bool, ContainerError> + Send + Sync + 'static,
{
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        (self.0)(ctx)
    }
}

/// Matches if every condition matches, evaluated in order
#[derive(Clone)]
pub struct All(pub Vec<Arc<dyn Condition>>);

impl All {
    pub fn and(mut self, other: impl Condition) -> Self {
        self.0.push(Arc::new(other));
        self
    }
}

impl Condition for All {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        for condition in &self.0 {
            if !condition.matches(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Matches if any condition matches, evaluated in order
#[derive(Clone)]
pub struct Any(pub Vec<Arc<dyn Condition>>);

impl Any {
    pub fn or(mut self, other: impl Condition) -> Self {
        self.0.push(Arc::new(other));
        self
    }
}

impl Condition for Any {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        for condition in &self.0 {
            if condition.matches(ctx)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Inverts a condition
pub struct Not<C>(C);

pub fn not<C: Condition>(condition: C) -> Not<C> {
    Not(condition)
}

impl<C: Condition> Condition for Not<C> {
    fn matches(&self, ctx: &mut dyn ConditionContext) -> Result<bool, ContainerError> {
        Ok(!self.0.matches(ctx)?)
    }
}

pub fn and(first: impl Condition, second: impl Condition) -> All {
    first.and(second)
}

pub fn or(first: impl Condition, second: impl Condition) -> Any {
    first.or(second)
}

/// Matches if no condition matches
pub fn none_of(conditions: impl IntoIterator<Item = Arc<dyn Condition>>) -> Not<Any> {
    Not(Any(conditions.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        properties: Properties,
        beans: Vec<&'static str>,
    }

    impl ConditionContext for Fixture {
        fn properties(&self) -> &Properties {
            &self.properties
        }

        fn find(&mut self, selector: &Selector) -> Result<Vec<BeanInfo>, ContainerError> {
            let Selector::Tag(name) = selector else {
                return Ok(Vec::new());
            };
            Ok(self
                .beans
                .iter()
                .filter(|bean| *bean == name)
                .map(|bean| BeanInfo::named(bean))
                .collect())
        }
    }

    fn fixture() -> Fixture {
        let mut properties = Properties::new();
        properties.set("feature.enabled", "true");
        properties.set("feature.mode", "${feature.default:=fast}");
        properties.set(ACTIVE_PROFILES, "dev, test");
        Fixture {
            properties,
            beans: vec!["db", "cache", "cache"],
        }
    }

    fn check(condition: impl Condition) -> bool {
        condition.matches(&mut fixture()).unwrap()
    }

    #[test]
    fn property_conditions() {
        assert!(check(on_property("feature.enabled")));
        assert!(check(on_property("FEATURE.ENABLED").having_value("true")));
        assert!(check(on_property("feature.mode").having_value("fast")));
        assert!(!check(on_property("feature.enabled").having_value("false")));
        assert!(!check(on_property("other")));
        assert!(check(on_property("other").match_if_missing()));
        assert!(check(on_property("feature")));
        assert!(check(on_missing_property("other")));
        assert!(!check(on_missing_property("feature.enabled")));
    }

    #[test]
    fn bean_conditions() {
        assert!(check(on_bean("db")));
        assert!(!check(on_bean("queue")));
        assert!(check(on_missing_bean("queue")));
        assert!(check(on_single_bean("db")));
        assert!(!check(on_single_bean("cache")));
    }

    #[test]
    fn profiles_and_combinators() {
        assert!(check(on_profile("test")));
        assert!(!check(on_profile("prod")));
        assert!(check(on_profile("dev").and(on_bean("db"))));
        assert!(!check(and(on_profile("dev"), on_bean("queue"))));
        assert!(check(or(on_profile("prod"), on_bean("db"))));
        assert!(check(not(on_profile("prod"))));
        assert!(check(none_of([
            Arc::new(on_profile("prod")) as Arc<dyn Condition>,
            Arc::new(on_bean("queue")),
        ])));
        assert!(check(on_matches(|ctx| Ok(ctx.has_property("feature.mode")))));
    }
}
