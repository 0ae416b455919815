mod commit;
mod commit_diff;
mod dedup;
mod file;
mod key;
mod matched_string;
mod repo;
mod result_match;
mod select;

pub use commit::*;
pub use commit_diff::*;
pub use dedup::*;
pub use file::*;
pub use key::*;
pub use matched_string::*;
pub use repo::*;
pub use result_match::*;
pub use select::*;
