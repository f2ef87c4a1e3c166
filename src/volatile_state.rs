use serenity::all::{ChannelId, Timestamp};
use std::collections::{HashMap, VecDeque};

/// State which is lost across sessions
pub struct VolatileState {
    pub memory: ChannelMemory,
}

impl VolatileState {
    pub fn new(channel_max_message_count: usize) -> Self {
        Self {
            memory: ChannelMemory::new(channel_max_message_count),
        }
    }
}

/// Short rolling conversation history per channel, used as context for generated replies.
///
/// Nothing is backfilled from Discord; a channel's memory starts empty the first time the bot is
/// spoken to there.
pub struct ChannelMemory {
    capacity: usize,
    channels: HashMap<ChannelId, VecDeque<MemoryEntry>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEntry {
    pub speaker: String,
    pub content: String,
    pub timestamp: Timestamp,
}

impl MemoryEntry {
    pub fn new(speaker: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            content: content.into(),
            timestamp: Timestamp::now(),
        }
    }
}

impl ChannelMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: HashMap::new(),
        }
    }

    pub fn get_or_create(&mut self, channel_id: ChannelId) -> &mut VecDeque<MemoryEntry> {
        self.channels.entry(channel_id).or_default()
    }

    /// Append, dropping the oldest entries beyond capacity.
    pub fn append(&mut self, channel_id: ChannelId, entry: MemoryEntry) {
        let capacity = self.capacity;
        let history = self.get_or_create(channel_id);
        history.push_back(entry);

        while history.len() > capacity {
            history.pop_front();
        }
    }

    /// Chronological copy of a channel's memory.  Empty for channels never written to.
    pub fn snapshot(&self, channel_id: ChannelId) -> Vec<MemoryEntry> {
        self.channels
            .get(&channel_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, channel_id: ChannelId) -> usize {
        self.channels.get(&channel_id).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_channel_is_empty() {
        let memory = ChannelMemory::new(20);
        assert!(memory.snapshot(ChannelId::new(1)).is_empty());
        assert_eq!(memory.len(ChannelId::new(1)), 0);
    }

    #[test]
    fn get_or_create_is_lazy_and_stable() {
        let mut memory = ChannelMemory::new(20);
        assert!(memory.get_or_create(ChannelId::new(1)).is_empty());
        memory.append(ChannelId::new(1), MemoryEntry::new("a", "hi"));
        assert_eq!(memory.get_or_create(ChannelId::new(1)).len(), 1);
    }

    #[test]
    fn keeps_most_recent_entries_in_order() {
        let mut memory = ChannelMemory::new(20);
        let channel = ChannelId::new(7);
        for i in 0..57 {
            memory.append(channel, MemoryEntry::new("user", i.to_string()));
            assert!(memory.len(channel) <= 20);
        }

        let contents: Vec<String> = memory
            .snapshot(channel)
            .into_iter()
            .map(|entry| entry.content)
            .collect();
        let expected: Vec<String> = (37..57).map(|i| i.to_string()).collect();
        assert_eq!(contents, expected);
    }

    #[test]
    fn channels_are_independent() {
        let mut memory = ChannelMemory::new(2);
        memory.append(ChannelId::new(1), MemoryEntry::new("a", "one"));
        memory.append(ChannelId::new(2), MemoryEntry::new("b", "two"));
        memory.append(ChannelId::new(2), MemoryEntry::new("b", "three"));
        memory.append(ChannelId::new(2), MemoryEntry::new("b", "four"));

        assert_eq!(memory.len(ChannelId::new(1)), 1);
        let second: Vec<String> = memory
            .snapshot(ChannelId::new(2))
            .into_iter()
            .map(|entry| entry.content)
            .collect();
        assert_eq!(second, vec!["three", "four"]);
    }
}
