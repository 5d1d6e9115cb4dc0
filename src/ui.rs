// file: src/ui.rs
// description: terminal dashboard that renders channel events as a status line and message rows
use crate::{
    channel_state::ConnectionStatus,
    events::{ChannelEvent, EventReceiver},
    formatter::{Colors, MessageFormatter, OutputFormat},
};
use tracing::debug;

pub struct UIController {
    event_receiver: EventReceiver,
    formatter: MessageFormatter,
    colored: bool,
    quiet_mode: bool,
    header_printed: bool,
    max_messages: Option<u64>,
}

pub struct UIOptions {
    pub colored: bool,
    pub quiet: bool,
    pub max_messages: u64,
}

impl UIController {
    pub fn new(event_receiver: EventReceiver, format: OutputFormat, options: UIOptions) -> Self {
        Self {
            event_receiver,
            formatter: MessageFormatter::new(format, options.colored),
            colored: options.colored,
            quiet_mode: options.quiet,
            header_printed: false,
            max_messages: if options.max_messages == 0 {
                None
            } else {
                Some(options.max_messages)
            },
        }
    }

    /// Render events until the sender side closes or the message limit is hit
    pub async fn run(&mut self) {
        self.print_banner();
        while let Some(event) = self.event_receiver.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
    }

    pub fn formatter(&self) -> &MessageFormatter {
        &self.formatter
    }

    fn handle_event(&mut self, event: ChannelEvent) -> bool {
        match event {
            ChannelEvent::Connecting { endpoint, attempt } => {
                let detail = if attempt > 0 {
                    format!("{} (retry {})", endpoint, attempt)
                } else {
                    endpoint
                };
                self.print_status(ConnectionStatus::Connecting, &detail);
            }
            ChannelEvent::Connected { connection_id } => {
                self.print_status(ConnectionStatus::Connected, &connection_id);
            }
            ChannelEvent::MessageReceived(message) => {
                if !self.header_printed {
                    if let Some(header) = self.formatter.header()
                        && !self.quiet_mode
                    {
                        println!("{}", header);
                    }
                    self.header_printed = true;
                }
                let line = self.formatter.format_message(&message);
                if !self.quiet_mode {
                    println!("{}", line);
                }

                if let Some(max_messages) = self.max_messages
                    && self.formatter.message_count() >= max_messages
                {
                    debug!("Reached configured max messages ({})", max_messages);
                    return false;
                }
            }
            ChannelEvent::MessageDropped { reason } => {
                debug!("Message dropped: {}", reason);
            }
            ChannelEvent::MessageSent { bytes } => {
                debug!("Sent {} bytes", bytes);
            }
            ChannelEvent::ConnectionFailed(reason) | ChannelEvent::TransportError(reason) => {
                self.print_error(&reason);
            }
            ChannelEvent::Reconnecting { attempt, delay } => {
                self.print_status(
                    ConnectionStatus::Disconnected,
                    &format!("reconnect {} in {}ms", attempt, delay.as_millis()),
                );
            }
            ChannelEvent::ReconnectsExhausted { attempts } => {
                self.print_error(&format!(
                    "Max reconnection attempts reached ({})",
                    attempts
                ));
            }
            ChannelEvent::Disconnected => {
                self.print_status(ConnectionStatus::Disconnected, "");
            }
        }

        true
    }

    fn print_banner(&self) {
        if self.quiet_mode {
            return;
        }
        let title = format!("LIVE FEED v{}", env!("CARGO_PKG_VERSION"));
        if self.colored {
            println!("{}{}{}{}", Colors::BOLD, Colors::BRIGHT_CYAN, title, Colors::RESET);
        } else {
            println!("{}", title);
        }
    }

    fn print_status(&self, status: ConnectionStatus, detail: &str) {
        // The status line is shown even in quiet mode
        println!("{}", self.formatter.status_line(status, detail));
    }

    fn print_error(&self, message: &str) {
        if self.colored {
            println!(
                "{}{}[ERROR]{} {}{}{}",
                Colors::BOLD,
                Colors::BRIGHT_RED,
                Colors::RESET,
                Colors::RED,
                message,
                Colors::RESET
            );
        } else {
            println!("[ERROR] {}", message);
        }
    }
}
