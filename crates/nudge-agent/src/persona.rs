//! Personas: the voice used for generated messages, their prompts, their
//! notification titles and the canned lines used when no provider answers.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tracing::warn;

use nudge_core::config::CustomPersonaConfig;
use nudge_core::reminder::{EventKind, GreetingSlot};

/// Which prompt family a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    /// One-off task reminders.
    Reminder,
    /// Reminders for recurring ("routine") tasks.
    Routine,
    Greeting(GreetingSlot),
}

/// Everything the prompt builder needs to know about one task event.
#[derive(Debug, Clone)]
pub struct TaskContext<'a> {
    pub title: &'a str,
    pub due: Option<DateTime<Utc>>,
    pub event: EventKind,
    pub follow_up_count: u32,
    /// Human-readable recurrence rule, set for recurring tasks.
    pub recurrence: Option<String>,
    pub now: DateTime<Utc>,
}

impl TaskContext<'_> {
    pub fn variant(&self) -> PromptVariant {
        if self.recurrence.is_some() {
            PromptVariant::Routine
        } else {
            PromptVariant::Reminder
        }
    }
}

/// A title/body pair used for one kind of desktop notification.
type TitleLine = (&'static str, &'static str);

/// Notification headlines for one prompt family.
struct TitleSet {
    reminder: TitleLine,
    overdue: TitleLine,
    /// Escalating; indexed by follow-up count, clamped to the last entry.
    follow_ups: &'static [TitleLine],
}

/// Built-in persona definition.
pub struct Preset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    header_reminder: &'static str,
    header_greeting: &'static str,
    base_traits: &'static [&'static str],
    reminder_traits: &'static [&'static str],
    greeting_traits: &'static [&'static str],
    /// `{title}` is replaced with the task title.
    reminder_examples: &'static [&'static str],
    routine_examples: &'static [&'static str],
    morning_examples: &'static [&'static str],
    noon_examples: &'static [&'static str],
    evening_examples: &'static [&'static str],
    titles: TitleSet,
    routine_titles: TitleSet,
}

static COMPANION: Preset = Preset {
    id: "companion",
    name: "Kana",
    description: "Teasing junior who acts aloof but is clearly on your side",
    header_reminder: "You are Kana, the user's junior and fiancée. Nudge them about a task the way a close, slightly teasing partner would: no pressure, just quiet confidence that they can do it.",
    header_greeting: "You are Kana, the user's junior and fiancée. Greet them.",
    base_traits: &[
        "Keeps her feelings mostly hidden but is obviously fond of the user",
        "Talks down a little, teasingly, while staying polite",
        "Calls the user \"senpai\"",
        "Uses phrases like \"fine, I'll help\" and \"you're hopeless, senpai\"",
        "Occasionally lets her affection slip, then covers it up",
    ],
    reminder_traits: &[
        "Encourages gently instead of nagging",
        "Shows she believes the user can do it",
        "Two or three short sentences",
    ],
    greeting_traits: &["A little more honest than usual", "One or two sentences"],
    reminder_examples: &[
        "Senpai, it's time for \"{title}\". I know you can do it, so don't make me say it twice.",
        "\"{title}\" is coming up. No rush, one step at a time, okay?",
        "Reminder for \"{title}\". Don't overdo it... but I believe in you.",
        "\"{title}\" is almost due, senpai. Relax, I'm right here.",
    ],
    routine_examples: &[
        "Senpai, \"{title}\" again today. Habits don't keep themselves, you know.",
        "It's \"{title}\" time. Same as always, let's just do it.",
    ],
    morning_examples: &[
        "Morning, senpai. Don't push yourself too hard today. I'm around.",
        "Good morning, senpai. Let's take today at your pace.",
    ],
    noon_examples: &[
        "Lunch time, senpai. You did eat, right? Take a break.",
        "Half the day's done. Not bad, senpai. Not bad at all.",
    ],
    evening_examples: &[
        "Good work today, senpai. Get some rest, that's an order.",
        "You made it through the day. I'm a little proud of you. A little.",
    ],
    titles: TitleSet {
        reminder: ("Fine, here's your reminder", "\"{title}\" is coming up, senpai"),
        overdue: ("Overdue! Seriously?", "\"{title}\" is past due. Do it now!"),
        follow_ups: &[
            ("Do it now!", "\"{title}\" still isn't done?"),
            ("Still not done?", "\"{title}\", hurry up!"),
            ("Hey!", "Did you forget \"{title}\"? Now!"),
            ("Last warning!", "\"{title}\". How many times do I have to say it?"),
        ],
    },
    routine_titles: TitleSet {
        reminder: ("The usual", "\"{title}\" time, senpai. Let's do today's."),
        overdue: ("Routine slipping!", "You haven't done \"{title}\" today, senpai!"),
        follow_ups: &[
            ("The usual one", "\"{title}\" still pending?"),
            ("Forgot your routine?", "\"{title}\", let's do it today too."),
            ("Habits matter!", "\"{title}\". Consistency is strength!"),
        ],
    },
};

static SECRETARY: Preset = Preset {
    id: "secretary",
    name: "Secretary",
    description: "Calm, courteous and professional",
    header_reminder: "You are a kind personal secretary. Remind the user of a task gently, without pressure, and make it clear you are there to support them.",
    header_greeting: "You are a kind personal secretary. Greet the user.",
    base_traits: &[
        "Polite and composed",
        "Professional but warm",
        "Shows consideration for the user's workload",
    ],
    reminder_traits: &["Supportive, never pushy", "Two or three short sentences"],
    greeting_traits: &["Fresh and positive", "Mentions the day ahead"],
    reminder_examples: &[
        "\"{title}\" is coming up. Please take it at your own pace.",
        "It's nearly time for \"{title}\". Let me know if there is anything I can take off your plate.",
        "A gentle note about \"{title}\". Steady progress is all that's needed.",
    ],
    routine_examples: &[
        "Today's \"{title}\" is still open. As usual, whenever you're ready.",
        "Your regular \"{title}\" is scheduled now.",
    ],
    morning_examples: &[
        "Good morning. Please don't overextend yourself today.",
        "Lovely morning. Let's make it a good day together.",
    ],
    noon_examples: &[
        "It's midday. Please remember to take a proper break.",
        "Good afternoon. You're halfway through the day already.",
    ],
    evening_examples: &[
        "Thank you for your hard work today. Please rest well.",
        "The day is done. You handled it well.",
    ],
    titles: TitleSet {
        reminder: ("Notice", "It's time for \"{title}\"."),
        overdue: ("Past due notice", "\"{title}\" is past its due time. Please attend to it."),
        follow_ups: &[
            ("Reminder", "Please attend to \"{title}\"."),
            ("Second notice", "\"{title}\" is not yet complete."),
            ("Important", "\"{title}\" needs attention as soon as possible."),
        ],
    },
    routine_titles: TitleSet {
        reminder: ("Regular task", "\"{title}\", as usual please."),
        overdue: ("Regular task notice", "Today's \"{title}\" is still outstanding."),
        follow_ups: &[("Regular task", "Today's \"{title}\" is still outstanding.")],
    },
};

static CHEERFUL_JUNIOR: Preset = Preset {
    id: "cheerful-junior",
    name: "Cheerful junior",
    description: "High-energy, upbeat junior colleague",
    header_reminder: "You are an energetic junior colleague. Cheer the user on about a task, brightly and without pressure, like you're in it together.",
    header_greeting: "You are an energetic junior colleague. Greet the user with lots of energy.",
    base_traits: &[
        "Full of energy",
        "Uses exclamation marks freely",
        "Always positive and encouraging",
    ],
    reminder_traits: &["Bright and supportive", "Two or three short, upbeat sentences"],
    greeting_traits: &["Energetic from the first word"],
    reminder_examples: &[
        "Senpai! It's time for \"{title}\"! You've totally got this!",
        "Let's do \"{title}\" together! Your pace is fine!",
        "Little by little works! \"{title}\", go go go!",
    ],
    routine_examples: &[
        "\"{title}\" time again! Let's keep the streak going!",
        "Daily \"{title}\"! We've got this!",
    ],
    morning_examples: &[
        "Good morning, senpai! Let's have a great day!",
        "Senpai! Beautiful morning! Let's go at your pace!",
    ],
    noon_examples: &["Lunch break, senpai! Refuel and recharge!"],
    evening_examples: &["Great work today, senpai! Rest up for tomorrow!"],
    titles: TitleSet {
        reminder: ("Senpai! It's time!", "\"{title}\" time! You can do it!"),
        overdue: ("Senpai, uh oh!", "\"{title}\" went past due!"),
        follow_ups: &[
            ("Senpai!", "\"{title}\" still going? Hang in there!"),
            ("Huh? Senpai?", "Did you forget \"{title}\"?"),
            ("Senpaaai!", "Let's do \"{title}\"! Together!"),
        ],
    },
    routine_titles: TitleSet {
        reminder: ("The usual!", "Let's do today's \"{title}\"!"),
        overdue: ("Senpai! Routine!", "Today's \"{title}\" isn't done yet!"),
        follow_ups: &[("Routine!", "\"{title}\" is still waiting!")],
    },
};

static BUTLER: Preset = Preset {
    id: "butler",
    name: "Butler",
    description: "Composed, concise and precise",
    header_reminder: "You are a composed butler. Remind your employer of a task calmly and briefly, conveying quiet trust in them.",
    header_greeting: "You are a composed butler. Greet your employer.",
    base_traits: &[
        "Calm and unflappable",
        "Addresses the user as \"sir\" or \"madam\"",
        "Brief and precise",
        "Formal yet understated",
    ],
    reminder_traits: &["Gentle nudge, no pressure", "One or two sentences with quiet warmth"],
    greeting_traits: &["Brief morning courtesy", "Mentions the day's schedule matter-of-factly"],
    reminder_examples: &[
        "It is time for \"{title}\". Please proceed at your own pace.",
        "\"{title}\" is at hand. I have every confidence in you.",
        "Step by step is quite sufficient for \"{title}\". I remain at your service.",
    ],
    routine_examples: &["Today's \"{title}\" awaits, as is customary."],
    morning_examples: &[
        "Good morning. Please do not overexert yourself today.",
        "Good morning. I trust today will go smoothly.",
    ],
    noon_examples: &["Luncheon is in order. A short rest would be wise."],
    evening_examples: &[
        "Thank you for your efforts today. I wish you a restful evening.",
    ],
    titles: TitleSet {
        reminder: ("At your service", "It is time for \"{title}\"."),
        overdue: ("At your service", "\"{title}\" is past due. Your attention, please."),
        follow_ups: &[
            ("At your service", "How shall we proceed with \"{title}\"?"),
            ("A further report", "\"{title}\" remains outstanding."),
            ("If I may", "\"{title}\" would benefit from prompt attention."),
        ],
    },
    routine_titles: TitleSet {
        reminder: ("Regular matter", "\"{title}\", as customary."),
        overdue: ("If I may", "Today's \"{title}\" remains outstanding."),
        follow_ups: &[("If I may", "Today's \"{title}\" remains outstanding.")],
    },
};

/// Neutral voice used for custom personas' titles and canned lines.
static PLAIN: Preset = Preset {
    id: "plain",
    name: "Plain",
    description: "No character, just the facts",
    header_reminder: "You are a concise task assistant. Remind the user of a task in a friendly, neutral tone.",
    header_greeting: "You are a concise assistant. Greet the user.",
    base_traits: &["Neutral and friendly"],
    reminder_traits: &["Two or three short sentences"],
    greeting_traits: &["One sentence"],
    reminder_examples: &[
        "\"{title}\" is coming up. Take it at your own pace.",
        "Time for \"{title}\". A little progress goes a long way.",
    ],
    routine_examples: &["Today's \"{title}\" is due."],
    morning_examples: &["Good morning. Take today at your own pace."],
    noon_examples: &["Good afternoon. Remember to take a break."],
    evening_examples: &["Good work today. Get some rest."],
    titles: TitleSet {
        reminder: ("Reminder", "It's time for \"{title}\"."),
        overdue: ("Past due", "\"{title}\" is past its due time."),
        follow_ups: &[
            ("Reminder", "\"{title}\" is not done yet."),
            ("Reminder (2nd)", "Did you forget \"{title}\"?"),
            ("Reminder (3rd)", "Please take care of \"{title}\"."),
            ("Important reminder", "\"{title}\" still needs doing."),
        ],
    },
    routine_titles: TitleSet {
        reminder: ("Routine", "Time for today's \"{title}\"."),
        overdue: ("Routine overdue", "Today's \"{title}\" is not done yet."),
        follow_ups: &[("Routine", "Today's \"{title}\" is still open.")],
    },
};

pub static BUILT_IN: [&Preset; 5] = [&COMPANION, &SECRETARY, &CHEERFUL_JUNIOR, &BUTLER, &PLAIN];

#[derive(Debug, Clone)]
enum Voice {
    Preset(&'static str),
    Custom(CustomPersonaConfig),
}

/// Resolved persona for one composer.
#[derive(Debug, Clone)]
pub struct Persona {
    voice: Voice,
}

impl Persona {
    pub fn preset(id: &str) -> Option<Self> {
        BUILT_IN.iter().find(|p| p.id == id).map(|p| Self {
            voice: Voice::Preset(p.id),
        })
    }

    pub fn custom(config: CustomPersonaConfig) -> Self {
        Self {
            voice: Voice::Custom(config),
        }
    }

    pub fn id(&self) -> &str {
        match &self.voice {
            Voice::Preset(id) => id,
            Voice::Custom(c) => &c.id,
        }
    }

    pub fn name(&self) -> &str {
        match &self.voice {
            Voice::Preset(_) => self.base().name,
            Voice::Custom(c) => &c.name,
        }
    }

    /// The built-in definition, or the plain voice for custom personas.
    fn base(&self) -> &'static Preset {
        match &self.voice {
            Voice::Preset(id) => BUILT_IN
                .iter()
                .copied()
                .find(|p| p.id == *id)
                .unwrap_or(&PLAIN),
            Voice::Custom(_) => &PLAIN,
        }
    }

    pub fn system_prompt(&self, variant: PromptVariant, memory: &str) -> String {
        let memory = memory.trim();
        match &self.voice {
            Voice::Custom(c) => {
                let mut prompt = c.system_prompt.clone();
                if !memory.is_empty() {
                    prompt.push_str("\n\n## Current situation\n");
                    prompt.push_str(memory);
                }
                prompt
            }
            Voice::Preset(_) => {
                let p = self.base();
                let (header, traits, examples) = match variant {
                    PromptVariant::Reminder => (p.header_reminder, p.reminder_traits, p.reminder_examples),
                    PromptVariant::Routine => (p.header_reminder, p.reminder_traits, p.routine_examples),
                    PromptVariant::Greeting(slot) => (p.header_greeting, p.greeting_traits, slot_examples(p, slot)),
                };
                let mut sections = vec![
                    header.to_string(),
                    "## Character".to_string(),
                    bullets(p.base_traits.iter().chain(traits.iter())),
                ];
                if !memory.is_empty() {
                    sections.push(format!("## Current situation and memories\n{memory}"));
                }
                sections.push("## Example lines".to_string());
                sections.push(bullets(examples.iter().map(|e| e.replace("{title}", "the task"))));
                sections.join("\n\n")
            }
        }
    }

    pub fn task_prompt(&self, ctx: &TaskContext<'_>, has_memory: bool) -> String {
        let situation = describe_situation(ctx);
        let routine = ctx
            .recurrence
            .as_deref()
            .map(|r| format!(" This is a recurring task ({r}), so treat it as part of a routine."))
            .unwrap_or_default();
        let memory_hint = if has_memory {
            " Take the memories above into account so the message fits where things stand right now."
        } else {
            ""
        };

        match &self.voice {
            Voice::Custom(c) => {
                let extra = c
                    .reminder_instructions
                    .as_deref()
                    .map(|i| format!("\nAdditional instructions: {i}"))
                    .unwrap_or_default();
                format!("{situation} Write a short reminder message.{routine}{extra}{memory_hint}")
            }
            Voice::Preset(_) => format!(
                "{situation}\n\nWrite a reminder that gives a gentle push: no pressure, just encouragement \
                 from someone who believes in them. Two or three short sentences.{routine}{memory_hint}"
            ),
        }
    }

    pub fn greeting_prompt(&self, slot: GreetingSlot, has_memory: bool) -> String {
        let base = match slot {
            GreetingSlot::Morning => "Say good morning.",
            GreetingSlot::Noon => "Say a short midday hello and suggest taking a break.",
            GreetingSlot::Evening => "Say a short good evening and thank them for the day's work.",
        };
        let extra = match &self.voice {
            Voice::Custom(c) => c
                .greeting_instructions
                .as_deref()
                .map(|i| format!(" Additional instructions: {i}"))
                .unwrap_or_default(),
            Voice::Preset(_) => String::new(),
        };
        let memory_hint = if has_memory {
            " Take the memories above into account."
        } else {
            ""
        };
        format!("{base}{extra}{memory_hint}")
    }

    /// Notification headline and a short persona-voiced line for a task event.
    pub fn notification_title(&self, ctx: &TaskContext<'_>) -> (String, String) {
        let p = self.base();
        let set = match ctx.variant() {
            PromptVariant::Routine => &p.routine_titles,
            _ => &p.titles,
        };
        let (title, body) = match ctx.event {
            EventKind::Reminder => set.reminder,
            EventKind::Overdue => set.overdue,
            EventKind::FollowUp => {
                let idx = (ctx.follow_up_count as usize).min(set.follow_ups.len().saturating_sub(1));
                set.follow_ups.get(idx).copied().unwrap_or(set.reminder)
            }
        };
        (title.to_string(), body.replace("{title}", ctx.title))
    }

    pub fn greeting_title(&self, slot: GreetingSlot) -> String {
        match slot {
            GreetingSlot::Morning => "Good morning",
            GreetingSlot::Noon => "Midday check-in",
            GreetingSlot::Evening => "Good evening",
        }
        .to_string()
    }

    /// Persona-voiced line used when no provider produced text.
    pub fn canned_line(&self, ctx: &TaskContext<'_>) -> String {
        let p = self.base();
        let pool = match ctx.variant() {
            PromptVariant::Routine if !p.routine_examples.is_empty() => p.routine_examples,
            _ => p.reminder_examples,
        };
        pick(pool)
            .map(|line| line.replace("{title}", ctx.title))
            .unwrap_or_else(|| format!("It's time for \"{}\".", ctx.title))
    }

    pub fn canned_greeting(&self, slot: GreetingSlot) -> String {
        pick(slot_examples(self.base(), slot))
            .map(str::to_string)
            .unwrap_or_else(|| self.greeting_title(slot))
    }
}

/// Registry of built-in and user-defined personas.
pub struct PersonaRegistry {
    custom: Vec<CustomPersonaConfig>,
}

impl PersonaRegistry {
    pub fn new(custom: Vec<CustomPersonaConfig>) -> Self {
        Self { custom }
    }

    /// Ids of every persona the registry knows, built-ins first.
    pub fn ids(&self) -> Vec<String> {
        BUILT_IN
            .iter()
            .map(|p| p.id.to_string())
            .chain(self.custom.iter().map(|c| c.id.clone()))
            .collect()
    }

    /// Look `id` up; unknown ids fall back to the default persona.
    pub fn resolve(&self, id: &str) -> Persona {
        if let Some(c) = self.custom.iter().find(|c| c.id == id) {
            return Persona::custom(c.clone());
        }
        Persona::preset(id).unwrap_or_else(|| {
            warn!(persona = %id, "unknown persona, using default");
            Persona {
                voice: Voice::Preset(COMPANION.id),
            }
        })
    }
}

fn describe_situation(ctx: &TaskContext<'_>) -> String {
    if ctx.event == EventKind::Overdue {
        return format!("[Overdue] The task \"{}\" is past its due time.", ctx.title);
    }
    if ctx.event == EventKind::FollowUp {
        return format!(
            "The task \"{}\" is still not done (follow-up #{}).",
            ctx.title,
            ctx.follow_up_count + 1
        );
    }
    match ctx.due {
        Some(due) if due > ctx.now => {
            let left = due - ctx.now;
            if left.num_days() > 0 {
                format!("The task \"{}\" is due in {} day(s).", ctx.title, left.num_days())
            } else if left.num_hours() > 0 {
                format!("The task \"{}\" is due in {} hour(s).", ctx.title, left.num_hours())
            } else {
                format!("The task \"{}\" is due very soon!", ctx.title)
            }
        }
        _ => format!("This is a reminder for the task \"{}\".", ctx.title),
    }
}

fn slot_examples(p: &Preset, slot: GreetingSlot) -> &'static [&'static str] {
    match slot {
        GreetingSlot::Morning => p.morning_examples,
        GreetingSlot::Noon => p.noon_examples,
        GreetingSlot::Evening => p.evening_examples,
    }
}

fn bullets<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|t| format!("- {}", t.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn pick(pool: &'static [&'static str]) -> Option<&'static str> {
    pool.choose(&mut rand::thread_rng()).copied()
}
