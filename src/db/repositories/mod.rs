mod plan_runs;
mod study_sessions;
