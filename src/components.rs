use crate::{embeds::truncate, queue::LoopMode, sources::Candidate};
use poise::serenity_prelude::{
    ButtonStyle, CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind,
    CreateSelectMenuOption, ReactionType,
};

pub const SEARCH_MENU_ID: &str = "search_select";
const PAGE_PREFIX: &str = "queue_page_";

/// Buttons attached to "Now Playing" messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Previous,
    PlayPause,
    Skip,
    Stop,
    Queue,
    Loop,
    Shuffle,
    VolumeDown,
    VolumeUp,
}

impl Control {
    const ALL: [Control; 9] = [
        Self::Previous,
        Self::PlayPause,
        Self::Skip,
        Self::Stop,
        Self::Queue,
        Self::Loop,
        Self::Shuffle,
        Self::VolumeDown,
        Self::VolumeUp,
    ];

    pub fn custom_id(self) -> &'static str {
        match self {
            Self::Previous => "music_previous",
            Self::PlayPause => "music_playpause",
            Self::Skip => "music_skip",
            Self::Stop => "music_stop",
            Self::Queue => "music_queue",
            Self::Loop => "music_loop",
            Self::Shuffle => "music_shuffle",
            Self::VolumeDown => "music_volume_down",
            Self::VolumeUp => "music_volume_up",
        }
    }

    pub fn from_custom_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|control| control.custom_id() == id)
    }
}

fn emoji(s: &str) -> ReactionType {
    ReactionType::Unicode(s.to_string())
}

fn button(control: Control, label: &str, icon: &str, style: ButtonStyle) -> CreateButton {
    CreateButton::new(control.custom_id())
        .label(label)
        .emoji(emoji(icon))
        .style(style)
}

pub fn now_playing_rows(paused: bool, loop_mode: LoopMode) -> Vec<CreateActionRow> {
    let (pause_label, pause_icon) = if paused {
        ("Resume", "▶️")
    } else {
        ("Pause", "⏸️")
    };
    let loop_style = match loop_mode {
        LoopMode::Off => ButtonStyle::Secondary,
        _ => ButtonStyle::Success,
    };

    vec![
        CreateActionRow::Buttons(vec![
            button(Control::Previous, "Previous", "⏮️", ButtonStyle::Primary),
            button(Control::PlayPause, pause_label, pause_icon, ButtonStyle::Primary),
            button(Control::Skip, "Skip", "⏭️", ButtonStyle::Primary),
            button(Control::Stop, "Stop", "⏹️", ButtonStyle::Danger),
            button(Control::Queue, "Queue", "📜", ButtonStyle::Secondary),
        ]),
        CreateActionRow::Buttons(vec![
            button(
                Control::Loop,
                &format!("Loop: {}", loop_mode.label()),
                "🔁",
                loop_style,
            ),
            button(Control::Shuffle, "Shuffle", "🔀", ButtonStyle::Secondary),
            button(Control::VolumeDown, "-10%", "🔉", ButtonStyle::Secondary),
            button(Control::VolumeUp, "+10%", "🔊", ButtonStyle::Secondary),
        ]),
    ]
}

pub fn pagination_row(page: usize, total_pages: usize) -> CreateActionRow {
    CreateActionRow::Buttons(vec![
        CreateButton::new(format!("{PAGE_PREFIX}{}", page.saturating_sub(1)))
            .label("Previous")
            .emoji(emoji("◀️"))
            .style(ButtonStyle::Primary)
            .disabled(page <= 1),
        CreateButton::new(format!("{PAGE_PREFIX}{}", page + 1))
            .label("Next")
            .emoji(emoji("▶️"))
            .style(ButtonStyle::Primary)
            .disabled(page >= total_pages),
    ])
}

/// Target page of a pagination button.
pub fn parse_page(custom_id: &str) -> Option<usize> {
    custom_id.strip_prefix(PAGE_PREFIX)?.parse().ok()
}

/// Option values are indexes into `candidates`.
pub fn search_menu(candidates: &[Candidate]) -> CreateActionRow {
    let options = candidates
        .iter()
        .enumerate()
        .map(|(i, candidate)| {
            let mut option = CreateSelectMenuOption::new(
                format!("{}. {}", i + 1, truncate(&candidate.title, 90)),
                i.to_string(),
            );
            if let Some(channel) = &candidate.channel {
                option = option.description(truncate(channel, 100));
            }
            option
        })
        .collect();

    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(SEARCH_MENU_ID, CreateSelectMenuKind::String { options })
            .placeholder("Choose a track"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_ids_round_trip() {
        for control in Control::ALL {
            assert_eq!(Control::from_custom_id(control.custom_id()), Some(control));
        }
        assert_eq!(Control::from_custom_id("music_unknown"), None);
        assert_eq!(Control::from_custom_id(SEARCH_MENU_ID), None);
    }

    #[test]
    fn page_buttons_carry_target_page() {
        assert_eq!(parse_page("queue_page_3"), Some(3));
        assert_eq!(parse_page("queue_page_x"), None);
        assert_eq!(parse_page("music_queue"), None);
    }

    #[test]
    fn now_playing_has_two_rows() {
        assert_eq!(now_playing_rows(false, LoopMode::Off).len(), 2);
    }
}
