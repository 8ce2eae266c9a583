use crate::state::SharedState;

const TEMPLATE: &str = include_str!("../../assets/index.html");

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Dashboard page with the router and cadence filled in.
pub fn render_index(state: &SharedState) -> String {
    let cadence = &state.cadence;
    TEMPLATE
        .replace("{{ROUTER}}", &escape_html(&state.router_host))
        .replace("{{POLL_SECONDS}}", &cadence.poll_seconds.to_string())
        .replace("{{POLL_MS}}", &cadence.poll_ms().to_string())
        .replace("{{WINDOW_MS}}", &cadence.window_ms().to_string())
}
