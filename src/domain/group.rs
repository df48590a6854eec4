//! Composite strategy: ordered AND over registered strategies.

use crate::domain::error::StrategistError;
use crate::domain::info::Info;
use crate::domain::kline::Kline;
use crate::domain::strategy::Strategy;
use std::sync::Arc;

/// Holds the handles resolved at construction, so later registry changes
/// do not affect an existing group.
#[derive(Debug)]
pub struct Group {
    name: String,
    members: Vec<Arc<dyn Strategy>>,
}

impl Group {
    /// Resolves every name through `lookup`, failing on the first unknown
    /// one.
    pub fn resolve<F>(names: &[String], lookup: F) -> Result<Self, StrategistError>
    where
        F: Fn(&str) -> Option<Arc<dyn Strategy>>,
    {
        if names.is_empty() {
            return Err(StrategistError::EmptyGroup);
        }
        let members = names
            .iter()
            .map(|name| {
                lookup(name).ok_or_else(|| StrategistError::UnknownStrategy {
                    name: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(members))
    }

    pub fn new(members: Vec<Arc<dyn Strategy>>) -> Self {
        let name = members
            .iter()
            .map(|m| m.name())
            .collect::<Vec<_>>()
            .join("+");
        Self { name, members }
    }

    pub fn members(&self) -> &[Arc<dyn Strategy>] {
        &self.members
    }
}

impl Strategy for Group {
    fn name(&self) -> &str {
        &self.name
    }

    fn signal(&self, info: &Info, day: &[Kline], min: &[Kline]) -> bool {
        self.members.iter().all(|m| m.signal(info, day, min))
    }

    fn lookback(&self) -> usize {
        self.members.iter().map(|m| m.lookback()).max().unwrap_or(1)
    }
}
