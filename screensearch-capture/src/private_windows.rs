//! Per-browser private/incognito window classification.
//!
//! Guessing at "probably private" from a title heuristic alone is a
//! privacy-sensitive decision, so this is kept to an explicit table of
//! markers per known browser family rather than a fuzzy match. A browser
//! not in this table is never classified as private - silence means
//! "don't know", not "assume private" or "assume normal".

/// One browser family's markers for recognizing a private/incognito window.
pub struct BrowserPrivacyMarkers {
    /// Suffix of the owning process's executable name, case-insensitive.
    pub process_exe_suffix: &'static str,
    /// Substrings that appear in the UI Automation "subrole"/class name
    /// reported for the window when it is in private mode.
    pub subrole_markers: &'static [&'static str],
    /// Substrings the window title carries while in private mode.
    pub title_suffix_patterns: &'static [&'static str],
}

/// Chromium-family and Firefox markers. Safari has no Windows build and is
/// intentionally left out rather than guessed at.
pub const BROWSER_PRIVACY_TABLE: &[BrowserPrivacyMarkers] = &[
    BrowserPrivacyMarkers {
        process_exe_suffix: "chrome.exe",
        subrole_markers: &["Incognito"],
        title_suffix_patterns: &["(Incognito)"],
    },
    BrowserPrivacyMarkers {
        process_exe_suffix: "msedge.exe",
        subrole_markers: &["InPrivate"],
        title_suffix_patterns: &["(InPrivate)"],
    },
    BrowserPrivacyMarkers {
        process_exe_suffix: "brave.exe",
        subrole_markers: &["Incognito", "Private"],
        title_suffix_patterns: &["(Incognito)", "(Private)"],
    },
    BrowserPrivacyMarkers {
        process_exe_suffix: "opera.exe",
        subrole_markers: &["Private"],
        title_suffix_patterns: &["(Private)"],
    },
    BrowserPrivacyMarkers {
        process_exe_suffix: "firefox.exe",
        subrole_markers: &["Private Browsing"],
        title_suffix_patterns: &["(Private Browsing)"],
    },
];

/// True if the given process/title combination matches a known browser's
/// private-mode markers. Unknown processes always return false.
pub fn is_private_window(process_name: &str, title: &str) -> bool {
    BROWSER_PRIVACY_TABLE.iter().any(|entry| {
        process_name
            .to_ascii_lowercase()
            .ends_with(entry.process_exe_suffix)
            && entry
                .title_suffix_patterns
                .iter()
                .any(|pattern| title.contains(pattern))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chrome_incognito_title_is_detected() {
        assert!(is_private_window(
            "chrome.exe",
            "example.com - Google Chrome (Incognito)"
        ));
    }

    #[test]
    fn chrome_normal_title_is_not_private() {
        assert!(!is_private_window(
            "chrome.exe",
            "example.com - Google Chrome"
        ));
    }

    #[test]
    fn unknown_browser_is_never_private() {
        assert!(!is_private_window("notepad.exe", "(Incognito) untitled"));
    }

    #[test]
    fn edge_inprivate_title_is_detected() {
        assert!(is_private_window(
            "msedge.exe",
            "example.com and 1 more page - Microsoft​ Edge (InPrivate)"
        ));
    }
}
