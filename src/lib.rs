//! Keep the upstream revisions pinned in build scripts up to date.
//!
//! ## How it works
//!
//! Build scripts declare their upstream sources with plain shell variables:
//!
//! ```sh
//! SCRIPT_REPO="https://github.com/madler/zlib.git"
//! SCRIPT_COMMIT="51b7f2abdade71cd9bb0e7a373ef2610ec6f9daf"
//! SCRIPT_TAGFILTER="v1.*"
//! ```
//!
//! Every script is parsed into **slots** (`SCRIPT_REPO`, `SCRIPT_REPO2` up to `SCRIPT_REPO9`),
//! each slot is handed to a **check** for its version control system (decided by which of
//! `SCRIPT_REV`, `SCRIPT_HGREV` or `SCRIPT_COMMIT` is set) and if the remote has a newer
//! revision, the variable is rewritten in place.
//!
//! ```ignore
//! +---------+       +-------+       +--------+       +--------+
//! | scripts | ----> | slots | ----> | checks | ----> | update |
//! +---------+       +-------+       +--------+       +--------+
//! ```
//!
//! Scripts that cannot be understood get a marker line appended for manual review.

/// Checks ask a remote repository for its latest revision ([git](checks::git::GitCheck),
/// [svn](checks::svn::SvnCheck) or [hg](checks::hg::HgCheck)).
pub mod checks;
/// Running external commands without ever failing the whole run.
pub mod command;
/// Parsing and rewriting the variables of a script.
pub mod script;
/// Finding the scripts and processing them on worker threads.
pub mod start;
/// Checking and updating a single script.
pub mod update;
