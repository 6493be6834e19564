//! The on-screen avatar.

#[cfg(feature = "avatar")]
pub mod avatar;
#[cfg(feature = "avatar")]
mod styles;

use std::path::{Path, PathBuf};

use crate::mood::Mood;

/// `<dir>/<mood>.gif`
pub fn gif_path(dir: &Path, mood: Mood) -> PathBuf {
    dir.join(format!("{mood}.gif"))
}

/// CSS class of the text badge shown when a mood has no animation.
pub fn badge_class(mood: Mood) -> String {
    format!("mood-{mood}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_gif_per_mood() {
        let dir = Path::new("/data/gifs");
        assert_eq!(gif_path(dir, Mood::Angry), Path::new("/data/gifs/angry.gif"));
        let mut names: Vec<_> = Mood::ALL.iter().map(|&m| gif_path(dir, m)).collect();
        names.dedup();
        assert_eq!(names.len(), Mood::ALL.len());
    }

    #[test]
    fn badge_classes() {
        assert_eq!(badge_class(Mood::Thinking), "mood-thinking");
    }
}
