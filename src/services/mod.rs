//! Service layer for the pipelines.
//!
//! - Game discovery and box-score extraction (`GameSource`, `NbaClient`)

mod games;

pub use games::{
    BOX_SCORE_LABEL, GameSource, NEXT_DATA_ID, NbaClient, extract_game, parse_box_score_links,
};
