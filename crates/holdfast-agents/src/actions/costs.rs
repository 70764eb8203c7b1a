//! Energy costs per action type.
//!
//! Item effects (nutrition, recovery, yield) are tunable and live in
//! [`NeedsConfig`](crate::NeedsConfig).

use holdfast_types::ActionType;

/// Energy spent by an action.
#[allow(clippy::match_same_arms)]
pub const fn energy_cost(action: ActionType) -> u32 {
    match action {
        ActionType::Move => 3,
        ActionType::Explore => 3,
        ActionType::Gather => 4,
        ActionType::Work => 6,
        ActionType::Consume => 0,
        ActionType::Buy => 0,
        ActionType::Trade => 0,
        ActionType::Sleep => 0,
        ActionType::Idle => 0,
    }
}
