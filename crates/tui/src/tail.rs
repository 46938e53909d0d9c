//! What the progress view shows, independent of how it is drawn.

use forge_types::WorkItem;

/// Frames of the running-item indicator.
pub const SPINNER: [char; 4] = ['-', '\\', '|', '/'];

/// Spinner frame for tick `count`.
pub fn spinner(count: usize) -> char {
    SPINNER[count % SPINNER.len()]
}

/// Summary line of an item: `<kind>[<status>]: <start summary>`.
pub fn summary_line(item: &WorkItem, spinner: char) -> String {
    let status = match (&item.finish_summary, item.is_finished()) {
        (Some(summary), true) => summary.clone(),
        _ => spinner.to_string(),
    };
    format!("{}[{}]: {}", item.kind, status, item.start_summary)
}

/// Whether an item's output is shown under its summary.
pub fn shows_output(item: &WorkItem) -> bool {
    (item.verbose || (item.is_finished() && !item.is_ok())) && !item.output.is_empty()
}

/// Summary line followed by the indented output lines, if shown.
pub fn item_lines(item: &WorkItem, spinner: char) -> Vec<String> {
    let mut lines = vec![summary_line(item, spinner)];
    if shows_output(item) {
        lines.extend(item.output.lines().map(|line| format!("  {line}")));
    }
    lines
}

/// The newest `limit` lines of the progress view, oldest first.
///
/// Items are walked newest first. Finished items that are not visible are skipped.
pub fn render_tail(items: &[WorkItem], limit: usize, spinner: char) -> Vec<String> {
    let mut tail = Vec::new();
    for item in items.iter().rev() {
        if tail.len() >= limit {
            break;
        }
        if item.is_finished() && !item.visible {
            continue;
        }
        for line in item_lines(item, spinner).into_iter().rev() {
            tail.push(line);
            if tail.len() >= limit {
                break;
            }
        }
    }
    tail.reverse();
    tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_types::ItemKind;

    fn item(id: u64, summary: &str) -> WorkItem {
        WorkItem::new(id, ItemKind::Command, summary, true, false)
    }

    #[test]
    fn running_items_show_the_spinner() {
        let running = item(1, "docker build . -t web");
        assert_eq!(render_tail(&[running], 10, '|'), vec!["command[|]: docker build . -t web"]);
    }

    #[test]
    fn failed_items_show_output_even_when_not_verbose() {
        let mut ok = item(1, "docker push web");
        ok.append("pushed\n");
        ok.finish(true, Some(0), "ok");
        let mut failed = item(2, "docker push db");
        failed.append("denied\nretry later\n");
        failed.finish(false, Some(1), "error(1)");

        assert_eq!(
            render_tail(&[ok, failed], 10, '-'),
            vec![
                "command[ok]: docker push web",
                "command[error(1)]: docker push db",
                "  denied",
                "  retry later",
            ]
        );
    }

    #[test]
    fn invisible_finished_items_are_skipped_even_on_failure() {
        let mut hidden = WorkItem::new(1, ItemKind::HttpGet, "GET https://r.example/v2/", false, false);
        hidden.append("unauthorized");
        hidden.finish(false, Some(500), "error(500)");
        let hidden_running = WorkItem::new(2, ItemKind::HttpGet, "GET https://r.example/token", false, false);

        assert_eq!(render_tail(&[hidden, hidden_running], 10, '/'), vec!["http-get[/]: GET https://r.example/token"]);
    }

    #[test]
    fn limit_keeps_the_newest_lines() {
        let mut verbose = WorkItem::new(1, ItemKind::Command, "kubectl apply -f k8s/web", true, true);
        verbose.append("a\nb\nc\n");
        let newest = item(2, "docker build");

        assert_eq!(render_tail(&[verbose, newest], 3, '-'), vec!["  b", "  c", "command[-]: docker build"]);
    }

    #[test]
    fn spinner_cycles() {
        let frames: String = (0..5).map(spinner).collect();
        assert_eq!(frames, "-\\|/-");
    }
}
