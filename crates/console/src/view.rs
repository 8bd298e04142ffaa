//! Terminal rendering of console lines and parsing of operator input.

use console_client::{ConnectionStatus, LineClass, LogLine, PowerSignal, SupervisorState};

const RESET: &str = "\x1b[0m";

fn class_style(class: LineClass) -> Option<&'static str> {
    match class {
        LineClass::Info => None,
        LineClass::Warn => Some("\x1b[33m"),
        LineClass::Error => Some("\x1b[31m"),
        LineClass::Social => Some("\x1b[36m"),
        LineClass::Command => Some("\x1b[1;32m"),
        LineClass::System => Some("\x1b[35m"),
        LineClass::Raw => Some("\x1b[2m"),
    }
}

fn paint(text: &str, style: Option<&str>, color: bool) -> String {
    match style {
        Some(style) if color => format!("{style}{text}{RESET}"),
        _ => text.to_string(),
    }
}

/// One scrollback line as printed: local time, then the text coloured by class.
pub fn render_line(line: &LogLine, color: bool) -> String {
    let time = line
        .timestamp()
        .with_timezone(&chrono::Local)
        .format("%H:%M:%S");
    format!("{time} {}", paint(line.text(), class_style(line.class()), color))
}

pub fn render_status(status: &ConnectionStatus, color: bool) -> String {
    let style = match status.state {
        SupervisorState::Live => "\x1b[32m",
        SupervisorState::Connecting | SupervisorState::Refreshing => "\x1b[33m",
        SupervisorState::Disconnected => "\x1b[31m",
    };
    let mut text = format!("-- console {status} --");
    if status.reconnect_available {
        text.push_str(" type /reconnect to try again");
    }
    paint(&text, Some(style), color)
}

/// What the operator typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(String),
    Power(PowerSignal),
    Reconnect,
    Status,
    Quit,
    Help,
    Invalid(String),
}

pub const HELP: &str = "\
/reconnect          reconnect after the console was disconnected
/power <signal>     start, stop, restart or kill the server
/status             show the connection status
/quit               close the console
anything else is sent to the server as a console command";

/// Lines starting with `/` are client actions; everything else is a console
/// command, passed through untouched.
pub fn parse_input(line: &str) -> Input {
    let Some(action) = line.trim().strip_prefix('/') else {
        return Input::Command(line.to_string());
    };

    let mut parts = action.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("reconnect"), None, _) => Input::Reconnect,
        (Some("status"), None, _) => Input::Status,
        (Some("quit" | "exit"), None, _) => Input::Quit,
        (Some("help"), None, _) => Input::Help,
        (Some("power"), Some(signal), None) => match signal.parse() {
            Ok(signal) => Input::Power(signal),
            Err(error) => Input::Invalid(error),
        },
        (Some("power"), _, _) => Input::Invalid("usage: /power <start|stop|restart|kill>".to_string()),
        _ => Input::Invalid(format!("unknown action /{action}, try /help")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rendering_has_no_escape_codes() {
        let line = LogLine::classified("[Server thread/WARN]: Can't keep up!");
        let rendered = render_line(&line, false);
        assert!(rendered.ends_with(" [Server thread/WARN]: Can't keep up!"));
        assert!(!rendered.contains('\x1b'));
    }

    #[test]
    fn test_colour_follows_class() {
        let warn = render_line(&LogLine::classified("WARN low memory"), true);
        assert!(warn.contains("\x1b[33mWARN low memory\x1b[0m"));

        let info = render_line(&LogLine::classified("Done (3.2s)!"), true);
        assert!(!info.contains('\x1b'));

        let echo = render_line(&LogLine::command_echo("list"), true);
        assert!(echo.contains("\x1b[1;32m> list"));
    }

    #[test]
    fn test_status_rendering() {
        let status = ConnectionStatus::new(
            SupervisorState::Disconnected,
            Some("console socket closed".to_string()),
        );
        assert_eq!(
            render_status(&status, false),
            "-- console disconnected (console socket closed) -- type /reconnect to try again"
        );
        let live = ConnectionStatus::new(SupervisorState::Live, None);
        assert_eq!(render_status(&live, false), "-- console live --");
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("say hello"), Input::Command("say hello".to_string()));
        assert_eq!(parse_input("  "), Input::Command("  ".to_string()));
        assert_eq!(parse_input("/reconnect"), Input::Reconnect);
        assert_eq!(parse_input(" /quit "), Input::Quit);
        assert_eq!(parse_input("/power Restart"), Input::Power(PowerSignal::Restart));
        assert!(matches!(parse_input("/power"), Input::Invalid(_)));
        assert!(matches!(parse_input("/power reboot"), Input::Invalid(_)));
        assert!(matches!(parse_input("/teleport"), Input::Invalid(_)));
    }
}
