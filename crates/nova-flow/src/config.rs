use serde::{Deserialize, Serialize};

use crate::lattice::{PackedParams, ParamSet};

/// Which [`ParamSet`](crate::ParamSet) representation to analyse with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamsRepr {
    /// Packed word when the arity fits, boolean array otherwise.
    #[default]
    Auto,
    /// Packed word; still falls back to the boolean array for large arities.
    Packed,
    Wide,
}

impl ParamsRepr {
    /// Whether a method of `arity` parameters is analysed with the packed
    /// representation.
    #[must_use]
    pub fn uses_packed(self, arity: usize) -> bool {
        match self {
            ParamsRepr::Auto | ParamsRepr::Packed => arity <= PackedParams::CAPACITY,
            ParamsRepr::Wide => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    /// The builder's frame-tracking mode: simulate frames while building a
    /// standalone CFG ([`build_cfg`](crate::build_cfg)), with `long` and
    /// `double` values spanning two slots, and reject methods whose frames
    /// cannot be merged. Full analysis always solves frames.
    pub verify_frames: bool,
    pub params: ParamsRepr,
    /// Floor for the instruction executions allowed during one fixed-point
    /// solve. The effective budget is at least [`update_bound`](crate::update_bound)
    /// of the method, so this can only raise it.
    pub max_frame_updates: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            verify_frames: true,
            params: ParamsRepr::Auto,
            max_frame_updates: 100_000,
        }
    }
}
