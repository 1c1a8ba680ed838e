use crate::{
    queue::{GuildQueue, Track},
    sources::Candidate,
};
use poise::serenity_prelude::{CreateEmbed, CreateEmbedFooter, Timestamp};
use std::time::Duration;

pub const PRIMARY: u32 = 0x5865f2;
pub const SUCCESS: u32 = 0x57f287;
pub const ERROR: u32 = 0xed4245;

const PROGRESS_WIDTH: usize = 20;

/// `M:SS`, or `H:MM:SS` from one hour on.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

fn format_length(duration: Option<Duration>) -> String {
    duration.map(format_duration).unwrap_or_else(|| "Unknown".to_string())
}

pub fn progress_bar(current: Duration, total: Duration, width: usize) -> String {
    let ratio = if total.is_zero() {
        0.0
    } else {
        (current.as_secs_f64() / total.as_secs_f64()).min(1.0)
    };
    let filled = (ratio * width as f64).floor() as usize;

    format!(
        "{}🔘{}",
        "▬".repeat(filled.saturating_sub(1)),
        "─".repeat(width.saturating_sub(filled.max(1)))
    )
}

pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn track_link(track: &Track, max: usize) -> String {
    format!("[{}]({})", truncate(&track.title, max), track.url)
}

pub fn now_playing(track: &Track, queue: &GuildQueue, elapsed: Duration) -> CreateEmbed {
    let progress = match track.duration {
        Some(total) => format!(
            "{}\n{} / {}",
            progress_bar(elapsed, total, PROGRESS_WIDTH),
            format_duration(elapsed),
            format_duration(total)
        ),
        None => format!("{} elapsed", format_duration(elapsed)),
    };
    let title = if queue.is_paused() {
        "Paused ⏸️"
    } else {
        "Now Playing 🎵"
    };

    let mut embed = CreateEmbed::new()
        .color(PRIMARY)
        .title(title)
        .description(format!("**{}**", track_link(track, 80)))
        .field("Duration", format_length(track.duration), true)
        .field("Volume", format!("{}%", queue.volume), true)
        .field("Loop", queue.loop_mode.label(), true)
        .field("Progress", progress, false)
        .footer(CreateEmbedFooter::new(format!(
            "Requested by {} | {} song(s) in queue",
            track.requested_by.name,
            queue.len()
        )))
        .timestamp(Timestamp::now());

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

pub fn track_added(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .color(SUCCESS)
        .title("Added to Queue")
        .description(format!("**{}**", track_link(track, 80)))
        .field("Duration", format_length(track.duration), true)
        .field("Position", format!("#{position}"), true)
        .field("Source", track.source.label(), true)
        .footer(CreateEmbedFooter::new(format!(
            "Requested by {}",
            track.requested_by.name
        )))
        .timestamp(Timestamp::now());

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    embed
}

pub fn playlist_added(name: &str, count: usize, skipped: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .color(SUCCESS)
        .title("Playlist Added to Queue")
        .description(format!("**{}**", truncate(name, 100)))
        .field("Songs Added", count.to_string(), true)
        .field("Source", "YOUTUBE", true)
        .timestamp(Timestamp::now());

    if skipped > 0 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "{skipped} song(s) skipped: queue is full"
        )));
    }
    embed
}

pub fn queue_description(queue: &GuildQueue, range: std::ops::Range<usize>) -> String {
    let mut description = String::new();

    if let Some(current) = queue.current() {
        description.push_str(&format!(
            "**Now Playing:**\n🎵 {} - `{}`\n\n",
            track_link(current, 60),
            format_length(current.duration)
        ));
    }

    let upcoming: Vec<String> = queue.tracks[range.clone()]
        .iter()
        .zip(range)
        .filter(|(_, index)| *index != queue.current_index)
        .map(|(track, index)| {
            format!(
                "`{}.` {} - `{}`",
                index + 1,
                track_link(track, 50),
                format_length(track.duration)
            )
        })
        .collect();

    if upcoming.is_empty() {
        description.push_str("*No more songs in queue*");
    } else {
        description.push_str("**Tracks:**\n");
        description.push_str(&upcoming.join("\n"));
    }

    description
}

pub fn queue_page(
    queue: &GuildQueue,
    page: usize,
    range: std::ops::Range<usize>,
    guild_name: &str,
) -> CreateEmbed {
    CreateEmbed::new()
        .color(PRIMARY)
        .title(format!("Queue for {}", truncate(guild_name, 80)))
        .description(queue_description(queue, range))
        .footer(CreateEmbedFooter::new(format!(
            "Page {}/{} | {} total song(s) | Volume: {}% | Loop: {}",
            page,
            crate::queue::total_pages(queue.len()),
            queue.len(),
            queue.volume,
            queue.loop_mode.label()
        )))
        .timestamp(Timestamp::now())
}

pub fn search_results(candidates: &[Candidate], query: &str) -> CreateEmbed {
    let mut description = format!("Search results for: **{}**\n\n", truncate(query, 100));
    for (i, candidate) in candidates.iter().enumerate() {
        description.push_str(&format!(
            "**{}.** [{}]({})\n{} • {}\n\n",
            i + 1,
            truncate(&candidate.title, 60),
            candidate.url,
            candidate.channel.as_deref().unwrap_or("Unknown channel"),
            format_length(candidate.duration)
        ));
    }

    CreateEmbed::new()
        .color(PRIMARY)
        .title("Search Results")
        .description(description)
        .footer(CreateEmbedFooter::new("Select a song from the menu below"))
        .timestamp(Timestamp::now())
}

pub fn info(title: &str, message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .color(PRIMARY)
        .title(title)
        .description(message)
        .timestamp(Timestamp::now())
}

pub fn success(message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .color(SUCCESS)
        .title("Success")
        .description(message)
        .timestamp(Timestamp::now())
}

pub fn error(message: impl Into<String>) -> CreateEmbed {
    CreateEmbed::new()
        .color(ERROR)
        .title("Error")
        .description(message)
        .timestamp(Timestamp::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::tests::queue_of;

    #[test]
    fn durations_switch_to_hours() {
        assert_eq!(format_duration(Duration::ZERO), "0:00");
        assert_eq!(format_duration(Duration::from_secs(65)), "1:05");
        assert_eq!(format_duration(Duration::from_secs(3599)), "59:59");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1:01:01");
    }

    #[test]
    fn progress_bar_places_the_knob() {
        let total = Duration::from_secs(100);

        assert_eq!(progress_bar(Duration::ZERO, total, 10), format!("🔘{}", "─".repeat(9)));
        assert_eq!(
            progress_bar(Duration::from_secs(50), total, 10),
            format!("{}🔘{}", "▬".repeat(4), "─".repeat(5))
        );
        assert_eq!(
            progress_bar(Duration::from_secs(500), total, 10),
            format!("{}🔘", "▬".repeat(9))
        );
        assert_eq!(progress_bar(Duration::from_secs(5), Duration::ZERO, 4), "🔘───");
    }

    #[test]
    fn progress_bar_keeps_its_width() {
        let total = Duration::from_secs(60);
        for secs in [0, 1, 3, 30, 59, 60, 120] {
            let bar = progress_bar(Duration::from_secs(secs), total, 20);
            assert_eq!(bar.chars().count(), 20, "at {secs}s: {bar}");
        }
        assert_eq!(progress_bar(Duration::ZERO, total, 0), "🔘");
    }

    #[test]
    fn truncate_counts_characters() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééé", 4), "é...");
    }

    #[test]
    fn queue_description_lists_other_tracks_with_positions() {
        let mut queue = queue_of(&["A", "B", "C"]);
        queue.current_index = 1;

        let text = queue_description(&queue, 0..3);

        assert!(text.starts_with("**Now Playing:**\n🎵 [B]"));
        assert!(text.contains("`1.` [A]"));
        assert!(text.contains("`3.` [C]"));
        assert!(!text.contains("`2.`"));
    }

    #[test]
    fn lone_track_has_nothing_queued() {
        let queue = queue_of(&["A"]);
        assert!(queue_description(&queue, 0..1).ends_with("*No more songs in queue*"));
    }
}
