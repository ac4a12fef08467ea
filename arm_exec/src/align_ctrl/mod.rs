//! # Alignment controller
//!
//! Visual servoing of the plunger over a tag. The controller runs as a
//! cyclic module: each tick it takes the freshest tag observation and
//! produces one jog vector, walking through its phases until the tag sits at
//! the taught camera offset and the stand-off height is reached.
//!
//! Rotation is corrected before any translation is allowed. Translating with
//! a large yaw error makes the in-plane errors rotate underneath the
//! controller and the approach spirals instead of converging, so translation
//! is fully suppressed until yaw is inside a tolerance which tightens as the
//! tool gets closer.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

pub use params::Params;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during AlignCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum AlignCtrlError {
    #[error("No tag observation for {0} ticks while aligning")]
    NoPoseData(u32),

    #[error("Alignment did not complete within {0} ticks")]
    BudgetExhausted(u32),

    #[error("AlignToTag commanded while no alignment target is taught")]
    NoTargetTaught,
}
