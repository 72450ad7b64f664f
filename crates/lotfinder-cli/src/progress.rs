use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};
use lotfinder_core::JobEvent;
use std::time::Duration;

/// Drain the controller's event channel, rendering an indicatif bar
/// until the job reaches a terminal event. Returns that event, or `None`
/// if the channel closed without one.
pub fn render_job(events: &Receiver<JobEvent>) -> Option<JobEvent> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template(
            "  {spinner:.cyan} [{bar:30.cyan/dim}] {pos:>3}% {msg}",
        )
        .unwrap()
        .progress_chars("━╸─")
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    bar.enable_steady_tick(Duration::from_millis(80));

    for event in events.iter() {
        match event {
            JobEvent::Started { kind } => {
                bar.set_message(format!("{} indexing...", kind.as_str()));
            }
            JobEvent::Progress { percent, status } => {
                bar.set_position(percent.max(0) as u64);
                bar.set_message(status);
            }
            terminal @ (JobEvent::Completed { .. }
            | JobEvent::Cancelled { .. }
            | JobEvent::Failed { .. }) => {
                bar.finish_and_clear();
                return Some(terminal);
            }
        }
    }

    bar.finish_and_clear();
    None
}
