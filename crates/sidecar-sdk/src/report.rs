use std::fmt;
use std::path::PathBuf;

use sidecar_store::RepairAction;
use sidecar_sync::PushOutcome;

use crate::error::SdkError;

/// How one path given to `add` was handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Moved into the store and replaced by a link to `target`.
    Added { target: PathBuf },
    /// The path is already a link and is tracked.
    AlreadyTracked,
    /// The path is a link that sidecar does not track.
    Symlink,
    /// The path could not be inspected.
    Unreadable(String),
    HashFailed(String),
    /// Hashing succeeded but moving or linking failed; the file is where it
    /// was.
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddReport {
    pub path: String,
    pub outcome: AddOutcome,
}

impl AddReport {
    pub fn is_failure(&self) -> bool {
        matches!(
            self.outcome,
            AddOutcome::Unreadable(_) | AddOutcome::HashFailed(_) | AddOutcome::Failed(_)
        )
    }
}

impl fmt::Display for AddReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = &self.path;
        match &self.outcome {
            AddOutcome::Added { target } => {
                write!(f, "Adding: {path:?} -> {:?}", target.to_string_lossy())
            }
            AddOutcome::AlreadyTracked => write!(f, "Already in the store, ignoring: {path:?}"),
            AddOutcome::Symlink => write!(f, "Path is a symbolic link, ignoring: {path:?}"),
            AddOutcome::Unreadable(err) => write!(f, "Cannot read {path:?}: {err}"),
            AddOutcome::HashFailed(err) => write!(f, "Could not compute hash: {path:?}: {err}"),
            AddOutcome::Failed(err) => write!(f, "Problem adding {path:?}: {err}"),
        }
    }
}

/// Archive state of one tracked file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StatusState {
    Ok,
    NotPushed,
    Error(String),
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusState::Ok => f.write_str("ok"),
            StatusState::NotPushed => f.write_str("not pushed"),
            StatusState::Error(err) => f.write_str(err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub path: String,
    pub state: StatusState,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.path, self.state)
    }
}

#[derive(Debug)]
pub struct PushReport {
    pub path: String,
    pub result: Result<PushOutcome, SdkError>,
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(_) => write!(f, "Pushed {:?}", self.path),
            Err(err) => write!(f, "Problem pushing {:?}: {err}", self.path),
        }
    }
}

/// What pulling one file involved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PullOutcome {
    /// `false` if the local blob was already intact.
    pub downloaded: bool,
    pub repair: RepairAction,
}

#[derive(Debug)]
pub struct PullReport {
    pub path: String,
    pub result: Result<PullOutcome, SdkError>,
}

impl fmt::Display for PullReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(_) => write!(f, "Pulled {:?}", self.path),
            Err(err) => write!(f, "Problem pulling {:?}: {err}", self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_lines() {
        let added = AddReport {
            path: "a.txt".into(),
            outcome: AddOutcome::Added {
                target: PathBuf::from(".sidecar/5d41402abc4b2a76b9719d911017c592"),
            },
        };
        assert_eq!(
            added.to_string(),
            "Adding: \"a.txt\" -> \".sidecar/5d41402abc4b2a76b9719d911017c592\""
        );
        assert!(!added.is_failure());

        let linked = AddReport {
            path: "a.txt".into(),
            outcome: AddOutcome::AlreadyTracked,
        };
        assert_eq!(linked.to_string(), "Already in the store, ignoring: \"a.txt\"");

        let foreign = AddReport {
            path: "l".into(),
            outcome: AddOutcome::Symlink,
        };
        assert_eq!(foreign.to_string(), "Path is a symbolic link, ignoring: \"l\"");

        let failed = AddReport {
            path: "b".into(),
            outcome: AddOutcome::Failed("boom".into()),
        };
        assert_eq!(failed.to_string(), "Problem adding \"b\": boom");
        assert!(failed.is_failure());
    }

    #[test]
    fn status_lines() {
        let report = |state| StatusReport {
            path: "a.txt".into(),
            state,
        };
        assert_eq!(report(StatusState::Ok).to_string(), "\"a.txt\": ok");
        assert_eq!(report(StatusState::NotPushed).to_string(), "\"a.txt\": not pushed");
        assert_eq!(
            report(StatusState::Error("network error: down".into())).to_string(),
            "\"a.txt\": network error: down"
        );
    }

    #[test]
    fn paths_are_quoted_with_escapes() {
        let report = StatusReport {
            path: "dir/with \"quote\".bin".into(),
            state: StatusState::Ok,
        };
        assert_eq!(report.to_string(), "\"dir/with \\\"quote\\\".bin\": ok");
    }

    #[test]
    fn push_and_pull_lines() {
        let pushed = PushReport {
            path: "a.txt".into(),
            result: Ok(PushOutcome::Uploaded),
        };
        assert_eq!(pushed.to_string(), "Pushed \"a.txt\"");

        let failed = PushReport {
            path: "a.txt".into(),
            result: Err(SdkError::MissingUrl),
        };
        assert!(failed.to_string().starts_with("Problem pushing \"a.txt\": "));

        let pulled = PullReport {
            path: "a.txt".into(),
            result: Ok(PullOutcome {
                downloaded: true,
                repair: RepairAction::Created,
            }),
        };
        assert_eq!(pulled.to_string(), "Pulled \"a.txt\"");

        let failed = PullReport {
            path: "a.txt".into(),
            result: Err(SdkError::Internal("x".into())),
        };
        assert_eq!(failed.to_string(), "Problem pulling \"a.txt\": internal error: x");
    }
}
