//! User facing strings in both supported languages. Ukrainian is the
//! default a new user starts in; English is opt-in via the language
//! keyboard.

use crate::quota::{Locale, DAILY_LIMIT};
use crate::ratings::JokeRecord;

/// Shown before any locale is known, so it carries both languages.
pub const CHOOSE_LANGUAGE: &str = "Виберіть мову / Choose language";

pub fn language_changed(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => "Мову змінено!",
        Locale::En => "Language changed!",
    }
}

pub fn help(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => {
            "/joke - Отримати жарт\n/top_jokes - Топ 10 жартів\n/check - Перевірити ліміти\n/help - Допомога"
        }
        Locale::En => {
            "/joke - Get a joke\n/top_jokes - Top 10 jokes\n/check - Check your limits\n/help - Help"
        }
    }
}

pub fn limit_reached(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => "Вибачте, ви досягли ліміту жартів на сьогодні!",
        Locale::En => "Sorry, you have reached your joke limit for today!",
    }
}

pub fn joke_failed(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => "Не вдалося отримати жарт.",
        Locale::En => "Could not fetch a joke right now.",
    }
}

pub fn check_report(locale: Locale, jokes_left: u32) -> String {
    match locale {
        Locale::Uk => {
            format!("📊 *Ваш ліміт на сьогодні:*\nЖарти: {jokes_left}/{DAILY_LIMIT}")
        }
        Locale::En => format!("📊 *Your limit today:*\nJokes: {jokes_left}/{DAILY_LIMIT}"),
    }
}

pub fn joke_message(locale: Locale, setup: &str, punchline: &str) -> String {
    match locale {
        Locale::Uk => format!("😂 *Жарт:*\n{setup}\n\n🤣 *Фінал:*\n{punchline}"),
        Locale::En => format!("😂 *Joke:*\n{setup}\n\n🤣 *Punchline:*\n{punchline}"),
    }
}

pub fn vote_counted(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => "Оцінка врахована!",
        Locale::En => "Vote counted!",
    }
}

pub fn vote_unknown(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => "Цей жарт вже недоступний.",
        Locale::En => "That joke is no longer available.",
    }
}

pub fn tally(locale: Locale, record: &JokeRecord) -> String {
    match locale {
        Locale::Uk => format!(
            "Жарт оновлено:\n👍 {} | 👎 {}",
            record.likes, record.dislikes
        ),
        Locale::En => format!(
            "Joke updated:\n👍 {} | 👎 {}",
            record.likes, record.dislikes
        ),
    }
}

pub fn top_empty(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => "Ще немає оцінених жартів!",
        Locale::En => "No rated jokes yet!",
    }
}

pub fn top_header(locale: Locale) -> &'static str {
    match locale {
        Locale::Uk => "🏆 *Топ 10 жартів:*\n",
        Locale::En => "🏆 *Top 10 jokes:*\n",
    }
}

pub fn top_entry(position: usize, record: &JokeRecord) -> String {
    format!(
        "{position}. 👍 {} | 👎 {}\n{} - {}\n\n",
        record.likes, record.dislikes, record.setup, record.punchline
    )
}
