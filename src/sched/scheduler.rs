use crate::sched::job::{JobAction, JobError, JobId, JobRecord, JobSpec, JobStatus, tags_match};
use std::collections::HashMap;
use std::time::Instant;

/// Monotonic time source of the scheduler, injectable so tests can
/// drive a simulated timeline.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;
    /// Used by the blocking wait entry points between ticks.
    fn sleep_ms(&self, ms: u64);
}

/// The process clock.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> SystemClock {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
}

/// The single external timer primitive driving the scheduler:
/// "call `schedule` after N milliseconds", plus cancellation.
pub trait TimerHost {
    fn arm(&mut self, ms: u64);
    fn cancel(&mut self);
}

/// Timer host for embeddings that drive `schedule`/`wait` manually.
pub struct NullTimer;

impl TimerHost for NullTimer {
    fn arm(&mut self, _ms: u64) {}
    fn cancel(&mut self) {}
}

/// Errors of the scheduler surface.
#[derive(Debug, thiserror::Error)]
pub enum SchedError {
    #[error("unknown job handle")]
    UnknownJob,
    #[error("interval must be at least 1 ms")]
    BadInterval,
}

/// A cooperative scheduler for recurring jobs.
///
/// Single threaded: commands run inside `schedule` on the caller's
/// thread and may freely create, reconfigure or destroy jobs,
/// including the one currently firing. Every pass over the job list
/// restarts after a fire or a removal, so mutation during a pass is
/// safe.
pub struct Scheduler {
    jobs: Vec<JobRecord>,
    current: Option<JobId>,
    last_time: Option<u64>,
    next_id: u32,
    clock: Box<dyn Clock>,
    timer: Box<dyn TimerHost>,
    background_error: Option<Box<dyn FnMut(JobId, JobError)>>,
}

impl Scheduler {
    pub fn new(clock: Box<dyn Clock>, timer: Box<dyn TimerHost>) -> Scheduler {
        Scheduler {
            jobs: Vec::new(),
            current: None,
            last_time: None,
            next_id: 0,
            clock,
            timer,
            background_error: None,
        }
    }

    /// Installs the sink that receives command errors of jobs
    /// without an error command.
    pub fn set_background_error<F: FnMut(JobId, JobError) + 'static>(&mut self, sink: F) {
        self.background_error = Some(Box::new(sink));
    }

    /// Creates a job. Defaults: interval 1000 ms, unbounded
    /// iterations, status waiting, no tags.
    pub fn create(&mut self, spec: JobSpec) -> Result<JobId, SchedError> {
        if spec.interval == Some(0) {
            return Err(SchedError::BadInterval);
        }
        self.next_id += 1;
        let id = JobId(self.next_id);
        let interval = spec.interval.unwrap_or(1000);
        let record = JobRecord {
            id,
            command: Some(spec.command.unwrap_or_else(noop_action)),
            new_command: None,
            error_command: spec.error_command,
            exit_command: spec.exit_command,
            interval,
            iterations: spec.iterations.unwrap_or(0),
            remtime: interval as i64,
            status: match spec.status {
                Some(JobStatus::Running) | None => JobStatus::Waiting,
                Some(status) => status,
            },
            tags: spec.tags.unwrap_or_default(),
            attributes: HashMap::new(),
        };
        // appended at the tail so firing order is creation order
        self.jobs.push(record);
        self.rearm();
        Ok(id)
    }

    /// Reconfigures a job. A command replacement becomes active at
    /// the next fire boundary, never during the current fire.
    pub fn configure(&mut self, id: JobId, spec: JobSpec) -> Result<(), SchedError> {
        if spec.interval == Some(0) {
            return Err(SchedError::BadInterval);
        }
        let index = self.index_of(id).ok_or(SchedError::UnknownJob)?;
        {
            let job = &mut self.jobs[index];
            if let Some(command) = spec.command {
                job.new_command = Some(command);
            }
            if let Some(command) = spec.error_command {
                job.error_command = Some(command);
            }
            if let Some(command) = spec.exit_command {
                job.exit_command = Some(command);
            }
            if let Some(interval) = spec.interval {
                job.interval = interval;
            }
            if let Some(iterations) = spec.iterations {
                job.iterations = iterations;
            }
            if let Some(tags) = spec.tags {
                job.tags = tags;
            }
            if let Some(status) = spec.status {
                // external code cannot force a job into `running`
                job.status = if status == JobStatus::Running {
                    JobStatus::Waiting
                } else {
                    status
                };
            }
        }
        // a resumed job must wake the scheduler again
        self.adjust_time();
        self.rearm();
        Ok(())
    }

    /// Marks a job for removal; the next sweep runs its exit
    /// command and deletes it.
    pub fn destroy(&mut self, id: JobId) -> Result<(), SchedError> {
        let index = self.index_of(id).ok_or(SchedError::UnknownJob)?;
        self.jobs[index].status = JobStatus::Expired;
        Ok(())
    }

    /// The job whose command is firing right now.
    pub fn current(&self) -> Option<JobId> {
        self.current
    }

    pub fn status(&self, id: JobId) -> Result<JobStatus, SchedError> {
        Ok(self.record(id)?.status)
    }

    pub fn interval(&self, id: JobId) -> Result<u64, SchedError> {
        Ok(self.record(id)?.interval)
    }

    pub fn iterations(&self, id: JobId) -> Result<u32, SchedError> {
        Ok(self.record(id)?.iterations)
    }

    pub fn tags(&self, id: JobId) -> Result<Vec<String>, SchedError> {
        Ok(self.record(id)?.tags.clone())
    }

    /// Remaining time until the next fire. Refreshes the time
    /// accounting first so the caller sees current numbers.
    pub fn remaining(&mut self, id: JobId) -> Result<i64, SchedError> {
        self.adjust_time();
        Ok(self.record(id)?.remtime)
    }

    pub fn attribute(&self, id: JobId, name: &str) -> Result<Option<String>, SchedError> {
        Ok(self.record(id)?.attributes.get(name).cloned())
    }

    pub fn set_attribute(&mut self, id: JobId, name: &str, value: &str) -> Result<(), SchedError> {
        let index = self.index_of(id).ok_or(SchedError::UnknownJob)?;
        self.jobs[index]
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn attribute_names(&self, id: JobId) -> Result<Vec<String>, SchedError> {
        let mut names: Vec<String> = self.record(id)?.attributes.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Lists jobs in creation order, filtered by status and by tag
    /// patterns (every pattern must match at least one tag).
    pub fn find(&self, status: Option<JobStatus>, tag_patterns: &[&str]) -> Vec<JobId> {
        self.jobs
            .iter()
            .filter(|job| status.map_or(true, |status| job.status == status))
            .filter(|job| tags_match(&job.tags, tag_patterns))
            .map(|job| job.id)
            .collect()
    }

    /// One scheduler tick: catch up the time accounting, fire every
    /// due job, sweep expired jobs and re-arm the timer.
    pub fn schedule(&mut self) {
        self.adjust_time();
        self.fire_pass();
        self.sweep_pass();
        // charge the time the commands took to the remaining budgets
        self.adjust_time();
        self.rearm();
    }

    /// Blocks until the given job is no longer waiting (fired its
    /// last iteration, was destroyed, or was suspended).
    pub fn wait(&mut self, id: JobId) {
        loop {
            match self.index_of(id) {
                Some(index) if self.jobs[index].status == JobStatus::Waiting => {}
                _ => return,
            }
            self.tick();
        }
    }

    /// Blocks until no job is waiting anymore.
    pub fn wait_all(&mut self) {
        while self
            .jobs
            .iter()
            .any(|job| job.status == JobStatus::Waiting)
        {
            self.tick();
        }
    }

    fn tick(&mut self) {
        self.schedule();
        let next = self
            .jobs
            .iter()
            .filter(|job| job.status == JobStatus::Waiting)
            .map(|job| job.remtime.max(0) as u64)
            .min();
        if let Some(ms) = next {
            self.clock.sleep_ms(ms);
        }
    }

    fn index_of(&self, id: JobId) -> Option<usize> {
        self.jobs.iter().position(|job| job.id == id)
    }

    fn record(&self, id: JobId) -> Result<&JobRecord, SchedError> {
        self.jobs
            .iter()
            .find(|job| job.id == id)
            .ok_or(SchedError::UnknownJob)
    }

    /// Subtracts the elapsed wall time from every non suspended
    /// job's remaining time. A clock that moved backwards charges
    /// nothing.
    fn adjust_time(&mut self) {
        let now = self.clock.now_ms();
        let Some(last) = self.last_time else {
            self.last_time = Some(now);
            return;
        };
        self.last_time = Some(now);
        let delta = now as i64 - last as i64;
        if delta <= 0 {
            return;
        }
        for job in &mut self.jobs {
            if job.status != JobStatus::Suspended {
                job.remtime -= delta;
            }
        }
    }

    /// Fires every waiting job whose remaining time reached zero.
    /// The pass restarts from the top after each fire because the
    /// command may have mutated the job list.
    fn fire_pass(&mut self) {
        loop {
            // pending command replacements activate at the fire
            // boundary
            for job in &mut self.jobs {
                if let Some(command) = job.new_command.take() {
                    job.command = Some(command);
                }
            }

            let Some(index) = self
                .jobs
                .iter()
                .position(|job| job.status == JobStatus::Waiting && job.remtime <= 0)
            else {
                return;
            };
            let id = self.jobs[index].id;
            self.jobs[index].status = JobStatus::Running;
            self.current = Some(id);

            let mut command = self.jobs[index].command.take();
            let result = match command.as_mut() {
                Some(action) => action(self),
                None => Ok(()),
            };

            self.current = None;

            // the command may have destroyed or moved the job
            let Some(index) = self.index_of(id) else {
                continue;
            };
            if self.jobs[index].command.is_none() {
                self.jobs[index].command = command;
            }

            if let Err(error) = result {
                self.handle_command_error(id, error);
            }

            let Some(index) = self.index_of(id) else {
                continue;
            };
            let job = &mut self.jobs[index];
            if job.status == JobStatus::Running {
                job.status = JobStatus::Waiting;
            }
            job.remtime = job.interval as i64;
            if job.iterations > 0 {
                job.iterations -= 1;
                if job.iterations == 0 {
                    job.status = JobStatus::Expired;
                }
            }
        }
    }

    /// Runs the error command of a failed job, or reports the error
    /// to the background sink and expires the job.
    fn handle_command_error(&mut self, id: JobId, error: JobError) {
        let Some(index) = self.index_of(id) else {
            return;
        };
        let mut error_command = self.jobs[index].error_command.take();
        match error_command.as_mut() {
            Some(action) => {
                // the error command's own result is not chained
                let _ = action(self);
                if let Some(index) = self.index_of(id) {
                    if self.jobs[index].error_command.is_none() {
                        self.jobs[index].error_command = error_command;
                    }
                }
            }
            None => {
                tracing::error!(job = %id, %error, "job command failed");
                if let Some(sink) = self.background_error.as_mut() {
                    sink(id, error);
                }
                if let Some(index) = self.index_of(id) {
                    self.jobs[index].status = JobStatus::Expired;
                }
            }
        }
    }

    /// Deletes every expired job after running its exit command.
    /// Restarts after each removal; exit commands may mutate the
    /// list.
    fn sweep_pass(&mut self) {
        loop {
            let Some(index) = self
                .jobs
                .iter()
                .position(|job| job.status == JobStatus::Expired)
            else {
                return;
            };
            let id = self.jobs[index].id;
            let exit_command = self.jobs[index].exit_command.take();
            if let Some(mut action) = exit_command {
                let _ = action(self);
            }
            if let Some(index) = self.index_of(id) {
                self.jobs.remove(index);
            }
        }
    }

    /// Installs the timer for the earliest waiting or expired job,
    /// or cancels it when none remain. Resetting the time origin
    /// here keeps idle periods from being charged to the first job
    /// created afterwards.
    fn rearm(&mut self) {
        let next = self
            .jobs
            .iter()
            .filter(|job| {
                job.status == JobStatus::Waiting || job.status == JobStatus::Expired
            })
            .map(|job| job.remtime.max(0) as u64)
            .min();
        match next {
            Some(ms) => self.timer.arm(ms),
            None => {
                self.last_time = None;
                self.timer.cancel();
            }
        }
    }
}

fn noop_action() -> JobAction {
    Box::new(|_| Ok(()))
}
