//! Outbound command backlog.

use latch_protocol::{Bitmap, CommandKind, ReaderCommand};

/// Pending commands, served newest first.
///
/// Only the newest command of each kind is kept: an LED, beep or draw
/// command replaces an unsent one of the same kind, so an animation that
/// draws faster than the link drains never replays stale frames. A reset
/// discards the backlog and is served before anything pushed after it.
/// Polls are never queued; the link synthesizes them when idle.
///
/// The neutral state (buzzer silent, LED off, display blank) is a barrier:
/// it discards the backlog, is sent in full and in that order, and nothing
/// pushed after it can replace it or overtake it.
#[derive(Debug, Default)]
pub struct CommandStack {
    entries: Vec<ReaderCommand>,
    /// Neutral-state commands still to send, last to send first.
    neutral: Vec<ReaderCommand>,
    reset_pending: bool,
}

impl CommandStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command.
    pub fn push(&mut self, command: ReaderCommand) {
        match command.kind() {
            CommandKind::Poll => {}
            CommandKind::Reset => {
                self.entries.clear();
                self.neutral.clear();
                self.reset_pending = true;
            }
            kind => {
                self.entries.retain(|queued| queued.kind() != kind);
                self.entries.push(command);
            }
        }
    }

    /// Queue the neutral state ahead of everything pushed later.
    pub fn push_neutral(&mut self) {
        self.entries.clear();
        self.neutral = vec![
            ReaderCommand::Draw(Bitmap::new()),
            ReaderCommand::Led(false),
            ReaderCommand::Beep(Vec::new()),
        ];
    }

    /// Take the next command to send.
    pub fn pop(&mut self) -> Option<ReaderCommand> {
        if self.reset_pending {
            self.reset_pending = false;
            return Some(ReaderCommand::Reset);
        }
        self.neutral.pop().or_else(|| self.entries.pop())
    }

    /// Drop everything, including a pending reset.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.neutral.clear();
        self.reset_pending = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.neutral.len() + usize::from(self.reset_pending)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use latch_protocol::{Bitmap, Note};

    fn drain(stack: &mut CommandStack) -> Vec<ReaderCommand> {
        std::iter::from_fn(|| stack.pop()).collect()
    }

    #[test]
    fn test_newest_first() {
        let mut stack = CommandStack::new();
        stack.push(ReaderCommand::Led(true));
        stack.push(ReaderCommand::Beep(vec![Note::new(440, 10, 128)]));
        stack.push(ReaderCommand::Draw(Bitmap::new()));

        let kinds: Vec<_> = drain(&mut stack).iter().map(ReaderCommand::kind).collect();
        assert_eq!(kinds, vec![CommandKind::Draw, CommandKind::Beep, CommandKind::Led]);
    }

    #[test]
    fn test_same_kind_replaces_unsent() {
        let mut stack = CommandStack::new();
        stack.push(ReaderCommand::Led(true));
        stack.push(ReaderCommand::Beep(Vec::new()));
        stack.push(ReaderCommand::Led(false));

        assert_eq!(stack.len(), 2);
        assert_eq!(
            drain(&mut stack),
            vec![ReaderCommand::Led(false), ReaderCommand::Beep(Vec::new())]
        );
    }

    #[test]
    fn test_reset_discards_backlog_and_goes_first() {
        let mut stack = CommandStack::new();
        stack.push(ReaderCommand::Led(true));
        stack.push(ReaderCommand::Reset);
        stack.push(ReaderCommand::Draw(Bitmap::new()));

        assert_eq!(
            drain(&mut stack),
            vec![ReaderCommand::Reset, ReaderCommand::Draw(Bitmap::new())]
        );
    }

    #[test]
    fn test_neutral_state_goes_before_later_commands() {
        let mut stack = CommandStack::new();
        stack.push(ReaderCommand::Led(true));
        stack.push(ReaderCommand::Beep(vec![Note::new(1852, 10, 128)]));
        stack.push_neutral();

        let mut frame = Bitmap::new();
        frame.fill_rect(0, 0, 10, 10, true);
        stack.push(ReaderCommand::Draw(frame.clone()));
        stack.push(ReaderCommand::Led(true));

        assert_eq!(
            drain(&mut stack),
            vec![
                ReaderCommand::Beep(Vec::new()),
                ReaderCommand::Led(false),
                ReaderCommand::Draw(Bitmap::new()),
                ReaderCommand::Led(true),
                ReaderCommand::Draw(frame),
            ]
        );
    }

    #[test]
    fn test_repeated_neutral_state_sent_once() {
        let mut stack = CommandStack::new();
        stack.push_neutral();
        stack.push_neutral();
        assert_eq!(stack.len(), 3);
    }

    #[test]
    fn test_poll_not_queued() {
        let mut stack = CommandStack::new();
        stack.push(ReaderCommand::Poll);
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_clear_drops_pending_reset() {
        let mut stack = CommandStack::new();
        stack.push(ReaderCommand::Reset);
        stack.push(ReaderCommand::Led(true));
        stack.clear();
        assert!(stack.is_empty());
    }
}
