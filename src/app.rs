// src/app.rs

use vanguard_rs_enum::{EnumConfig, RunStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Idle,
    Enumerating,
    Finished,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub names_read: usize,
    pub unique_names: usize,
    pub duplicates: usize,
    pub subdomains_resubmitted: usize,
    pub deliveries: usize,
    pub graph_nodes: usize,
}

pub struct App {
    pub state: AppState,
    pub run_id: String,
    pub domains: Vec<String>,
    pub summary: RunSummary,
}

impl App {
    pub fn new(config: &EnumConfig) -> Self {
        Self {
            state: AppState::Idle,
            run_id: config.run_id.clone(),
            domains: config.domains.clone(),
            summary: RunSummary::default(),
        }
    }

    pub fn start(&mut self) {
        self.state = AppState::Enumerating;
    }

    pub fn finish(&mut self, stats: RunStats) {
        self.summary = RunSummary {
            names_read: stats.submitted,
            unique_names: stats.accepted,
            duplicates: stats.dropped,
            subdomains_resubmitted: stats.resubmitted,
            deliveries: stats.dispatched,
            graph_nodes: stats.graph_nodes,
        };
        self.state = AppState::Finished;
    }

    /// A short human-readable report, printed on stderr at the end of a run.
    pub fn report(&self) -> String {
        let s = &self.summary;
        format!(
            "run {} ({})\n  \
             names read:          {}\n  \
             unique names:        {}\n  \
             dropped/duplicates:  {}\n  \
             subdomains re-fed:   {}\n  \
             deliveries:          {}\n  \
             graph nodes:         {}",
            self.run_id,
            self.domains.join(", "),
            s.names_read,
            s.unique_names,
            s.duplicates,
            s.subdomains_resubmitted,
            s.deliveries,
            s.graph_nodes,
        )
    }
}
