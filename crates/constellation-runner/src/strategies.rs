//! Builds a fresh `Strategy` instance for a named job. Each `(strategy,
//! repetition)` job gets its own instance at the reference implementation's
//! construction-time defaults — `original_source/main.py` builds its
//! `strategies` list once and relies on `ProcessPoolExecutor` pickling a
//! fresh copy into each worker process; a freshly constructed instance per
//! job is the direct analogue for a thread-pool worker that shares no state.

use constellation_strategy::{BentPipe, ContextAxes, Dijkstra, Gounder, QLearning, RandomStrategy, Strategy, TileCodedUcb, Ucb1};

/// Strategy names in the reference implementation's declared order.
pub const STRATEGY_NAMES: [&str; 7] = ["random", "bent_pipe", "dijkstra", "gounder", "ucb", "q_learning", "tile_coded_ucb"];

pub fn build_strategy(name: &str, seed: u64) -> Option<Box<dyn Strategy>> {
    match name {
        "random" => Some(Box::new(RandomStrategy::new(seed))),
        "bent_pipe" => Some(Box::new(BentPipe::new(seed))),
        "dijkstra" => Some(Box::new(Dijkstra::default())),
        "gounder" => Some(Box::new(Gounder::new())),
        "ucb" => Some(Box::new(Ucb1::new())),
        "q_learning" => Some(Box::new(QLearning::new(seed))),
        "tile_coded_ucb" => Some(Box::new(TileCodedUcb::new(ContextAxes::distance_only(), 5e5, 2))),
        _ => None,
    }
}
