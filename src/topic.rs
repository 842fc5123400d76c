//! Off-topic detection for the optional preparedness topic gate

/// Words and phrases that mark a message as preparedness-related
const PREP_KEYWORDS: &[&str] = &[
    // hazards and scenarios
    "blackout", "power", "outage", "storm", "hurricane", "tornado", "earthquake", "wildfire",
    "evacuate", "evacuation", "shelter", "blizzard", "heatwave", "flood", "disaster", "emergency",
    // essentials and gear
    "water", "food", "lighting", "lantern", "battery", "batteries", "radio", "first aid",
    "bandage", "trauma", "ifak", "generator", "charger", "power bank", "filter", "purifier",
    "noaa", "flashlight",
    // planning
    "go bag", "gobag", "bug out", "72-hour", "checklist", "kit", "preparedness", "survival",
    "responder",
];

/// Example scenarios listed by `/topics`
const TOPIC_EXAMPLES: &[(&str, &str)] = &[
    ("Blackout (72 hours)", "3-day power outage, two adults + one child, budget $150"),
    ("Go-bag (24-72h)", "What goes in a basic go-bag for two adults?"),
    ("Water planning", "How much water should I store for 3 people and a dog?"),
    ("First aid basics", "What should I keep for bleeding control at home?"),
    ("Storm prep", "Storm incoming this weekend, what should I do today?"),
    ("Communications", "How do I get NOAA weather alerts without internet?"),
];

/// Whether `text` looks unrelated to preparedness
///
/// Empty and very short messages count as off-topic.
#[must_use]
pub fn is_off_topic(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return true;
    }

    let letters = lower.chars().filter(|c| c.is_alphabetic()).count();
    if lower.chars().count() <= 3 && letters <= 3 {
        return true;
    }

    !PREP_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Reply sent instead of a generation when the gate rejects a message
#[must_use]
pub fn nudge_text() -> String {
    [
        "I'm here to help with emergency preparedness.",
        "",
        "Try something like:",
        "• 3-day power outage for a family of 4, what do we need?",
        "• What should go in a basic go-bag?",
        "• How much water should I store for two adults and a dog?",
        "",
        "You can also send /topics to see examples, or /buy radio for quick links.",
    ]
    .join("\n")
}

/// Body of the `/topics` reply
#[must_use]
pub fn topics_text() -> String {
    let mut lines = vec!["Common scenarios I can help with:".to_string()];
    lines.extend(
        TOPIC_EXAMPLES
            .iter()
            .map(|(title, example)| format!("• {title}: {example}")),
    );
    lines.push(String::new());
    lines.push("Tip: try /buy radio or /buy first aid for quick links.".to_string());
    lines.join("\n")
}
