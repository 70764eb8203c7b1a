//! Grid neighbourhoods and deterministic exploration.

use holdfast_types::{AgentId, GridSize, Position};

/// In-bounds orthogonal neighbours in north, east, south, west order.
pub fn neighbours(position: Position, grid: GridSize) -> Vec<Position> {
    let candidates = [
        position.y.checked_sub(1).map(|y| Position::new(position.x, y)),
        position.x.checked_add(1).map(|x| Position::new(x, position.y)),
        position.y.checked_add(1).map(|y| Position::new(position.x, y)),
        position.x.checked_sub(1).map(|x| Position::new(x, position.y)),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter(|p| grid.contains(*p))
        .collect()
}

/// The cell an exploring agent steps to.
///
/// The starting direction rotates with `agent_id + tick`, and the first
/// in-bounds neighbour from there wins. Returns `None` only on a 1x1 grid.
pub fn explore_target(
    agent_id: AgentId,
    tick: u64,
    position: Position,
    grid: GridSize,
) -> Option<Position> {
    let options = neighbours(position, grid);
    let len = u64::try_from(options.len()).ok()?;
    let start = agent_id.into_inner().wrapping_add(tick).checked_rem(len)?;
    let start = usize::try_from(start).ok()?;
    options.get(start).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: GridSize = GridSize {
        width: 5,
        height: 5,
    };

    #[test]
    fn corner_has_two_neighbours() {
        let found = neighbours(Position::new(0, 0), GRID);
        assert_eq!(found, vec![Position::new(1, 0), Position::new(0, 1)]);
    }

    #[test]
    fn interior_has_four_neighbours() {
        assert_eq!(neighbours(Position::new(2, 2), GRID).len(), 4);
    }

    #[test]
    fn explore_is_deterministic_and_adjacent() {
        let origin = Position::new(2, 2);
        let a = explore_target(AgentId::new(3), 7, origin, GRID);
        let b = explore_target(AgentId::new(3), 7, origin, GRID);
        assert_eq!(a, b);
        assert!(a.is_some_and(|p| p.is_adjacent(origin)));
    }

    #[test]
    fn explore_varies_with_tick() {
        let origin = Position::new(2, 2);
        let first = explore_target(AgentId::new(1), 0, origin, GRID);
        let second = explore_target(AgentId::new(1), 1, origin, GRID);
        assert_ne!(first, second);
    }

    #[test]
    fn single_cell_grid_has_nowhere_to_go() {
        let tiny = GridSize {
            width: 1,
            height: 1,
        };
        assert_eq!(explore_target(AgentId::new(1), 0, Position::new(0, 0), tiny), None);
    }
}
