use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LaneIdError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(String);

impl VehicleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for VehicleId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lane identifier of the form `<edge>_<index>`, index 0 being the rightmost lane.
/// Edge names may themselves contain underscores; only the last suffix is the index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneId(String);

impl LaneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_parts(edge: &str, index: u32) -> Self {
        Self(format!("{}_{}", edge, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn split(&self) -> Result<(&str, &str), LaneIdError> {
        self.0
            .rsplit_once('_')
            .ok_or_else(|| LaneIdError::MissingIndex(self.0.clone()))
    }

    pub fn edge(&self) -> Result<&str, LaneIdError> {
        Ok(self.split()?.0)
    }

    pub fn index(&self) -> Result<u32, LaneIdError> {
        let (_, index) = self.split()?;
        index.parse().map_err(|source| LaneIdError::BadIndex {
            lane: self.0.clone(),
            source,
        })
    }

    pub fn with_index(&self, index: u32) -> Result<LaneId, LaneIdError> {
        Ok(Self::from_parts(self.edge()?, index))
    }
}

impl From<&str> for LaneId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
