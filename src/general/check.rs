use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::general::forwarder::PipelineStats;
use crate::general::queue::QueueStats;
use crate::remote::osc_sender::Target;

static BANNER_PRINTED: AtomicBool = AtomicBool::new(false);

/// Counters shown by the `stats` console command.
#[derive(Clone)]
pub struct StatusSources {
    pub queue: Arc<QueueStats>,
    pub pipeline: Arc<PipelineStats>,
    pub targets: Vec<Target>,
}

fn print_colored(color: Color, text: &str) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let _ = stdout.set_color(ColorSpec::new().set_fg(Some(color)).set_intense(true));
    let _ = writeln!(&mut stdout, "{}", text);
    let _ = stdout.reset();
}

// Print the quick help line in blue (works on Windows CMD via termcolor)
pub fn print_quick_help() {
    print_colored(Color::Blue, "Type 'help' for commands, 'exit' to quit");
}

fn claim_banner() -> bool {
    BANNER_PRINTED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

pub fn print_bridge_active(port_name: &str, targets: usize) {
    if !claim_banner() {
        return;
    }
    print_colored(
        Color::Green,
        &format!("Bridge active | '{}' -> {} OSC target(s)", port_name, targets),
    );
    print_quick_help();
}

pub fn print_bridge_failed(reason: &str) {
    if !claim_banner() {
        return;
    }
    print_colored(Color::Red, &format!("Bridge not started | {}", reason));
}

pub fn format_stats(sources: &StatusSources) -> Vec<String> {
    let mut lines = vec![
        format!(
            "MIDI    received {:>8}  queue drops {:>6}",
            sources.queue.pushed(),
            sources.queue.dropped()
        ),
        format!(
            "decode  events   {:>8}  errors {:>11}  OSC out {:>8}",
            sources.pipeline.events(),
            sources.pipeline.decode_errors(),
            sources.pipeline.osc_messages()
        ),
    ];
    for target in &sources.targets {
        let stats = target.stats();
        lines.push(format!(
            "target  {:<16} {}:{}  sent {}  errors {}  dropped {}{}",
            target.name(),
            target.address(),
            target.port(),
            stats.sent(),
            stats.errors(),
            stats.dropped(),
            if stats.is_alive() { "" } else { "  (failing)" }
        ));
    }
    lines
}

pub fn print_stats(sources: &StatusSources) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    for line in format_stats(sources) {
        let failing = line.ends_with("(failing)");
        if failing {
            let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
        }
        let _ = writeln!(&mut stdout, "{}", line);
        if failing {
            let _ = stdout.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_lines_per_target() {
        let sources = StatusSources {
            queue: Arc::new(QueueStats::default()),
            pipeline: Arc::new(PipelineStats::default()),
            targets: vec![Target::new("desk", "10.0.0.2", 9000), Target::new("laptop", "10.0.0.3", 9001)],
        };
        let lines = format_stats(&sources);
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("desk"));
        assert!(lines[3].contains("10.0.0.3:9001"));
        assert!(!lines[3].ends_with("(failing)"));
    }
}
