use std::collections::HashMap;

/// Handle of a scheduled job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct JobId(pub(crate) u32);

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "job{}", self.0)
    }
}

/// The lifecycle states of a job.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// Not scheduled; its remaining time is frozen.
    Suspended,
    /// Scheduled; fires when the remaining time reaches zero.
    Waiting,
    /// Its command is being evaluated right now.
    Running,
    /// Finished; removed in the next sweep.
    Expired,
}

impl JobStatus {
    pub fn name(&self) -> &'static str {
        match self {
            JobStatus::Suspended => "suspended",
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Expired => "expired",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error raised by a job command; routed to the job's error command
/// or the scheduler's background error sink.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobError(pub String);

impl core::fmt::Display for JobError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for JobError {}

/// A deferred action bound to a job. Actions receive the scheduler
/// so they can create, configure and destroy jobs, including their
/// own.
pub type JobAction = Box<dyn FnMut(&mut crate::sched::Scheduler) -> Result<(), JobError>>;

/// Options for creating or reconfiguring a job; `None` fields keep
/// their current (or default) value.
#[derive(Default)]
pub struct JobSpec {
    /// The command to evaluate on every fire. On reconfiguration
    /// the replacement takes effect at the next fire boundary.
    pub command: Option<JobAction>,
    /// Run when the command fails.
    pub error_command: Option<JobAction>,
    /// Run once when the job is removed.
    pub exit_command: Option<JobAction>,
    /// Fire interval in milliseconds, at least 1.
    pub interval: Option<u64>,
    /// Remaining fires; 0 means unbounded.
    pub iterations: Option<u32>,
    /// Status change; `Running` is coerced to `Waiting`.
    pub status: Option<JobStatus>,
    /// Replaces the tag list.
    pub tags: Option<Vec<String>>,
}

/// Internal job record.
pub(crate) struct JobRecord {
    pub id: JobId,
    /// `None` only while the command is being evaluated.
    pub command: Option<JobAction>,
    /// Pending replacement, swapped in at the next fire boundary.
    pub new_command: Option<JobAction>,
    pub error_command: Option<JobAction>,
    pub exit_command: Option<JobAction>,
    pub interval: u64,
    pub iterations: u32,
    /// Milliseconds until the next fire; may go negative while the
    /// scheduler catches up.
    pub remtime: i64,
    pub status: JobStatus,
    pub tags: Vec<String>,
    pub attributes: HashMap<String, String>,
}

/// Glob match in the embedded command style: `*`, `?`, `[...]`
/// (with ranges) and backslash escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    glob_match_inner(
        &pattern.chars().collect::<Vec<_>>(),
        &text.chars().collect::<Vec<_>>(),
    )
}

fn glob_match_inner(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => {
            // greedy star: try every split point
            (0..=text.len()).any(|skip| glob_match_inner(rest, &text[skip..]))
        }
        Some(('?', rest)) => match text.split_first() {
            Some((_, text_rest)) => glob_match_inner(rest, text_rest),
            None => false,
        },
        Some(('[', rest)) => {
            let Some(end) = rest.iter().position(|c| *c == ']') else {
                return false;
            };
            let (class, after) = rest.split_at(end);
            let Some((ch, text_rest)) = text.split_first() else {
                return false;
            };
            if !class_matches(class, *ch) {
                return false;
            }
            glob_match_inner(&after[1..], text_rest)
        }
        Some(('\\', rest)) => match (rest.split_first(), text.split_first()) {
            (Some((escaped, rest)), Some((ch, text_rest))) if escaped == ch => {
                glob_match_inner(rest, text_rest)
            }
            _ => false,
        },
        Some((literal, rest)) => match text.split_first() {
            Some((ch, text_rest)) if ch == literal => glob_match_inner(rest, text_rest),
            _ => false,
        },
    }
}

fn class_matches(class: &[char], ch: char) -> bool {
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == '-' {
            if class[i] <= ch && ch <= class[i + 2] {
                return true;
            }
            i += 3;
        } else {
            if class[i] == ch {
                return true;
            }
            i += 1;
        }
    }
    false
}

/// True when every pattern matches at least one tag.
pub fn tags_match(tags: &[String], patterns: &[&str]) -> bool {
    patterns
        .iter()
        .all(|pattern| tags.iter().any(|tag| glob_match(pattern, tag)))
}
