//! Randomized browser user agents.

use rand::seq::SliceRandom;

const BROWSERS: &[&str] = &["Chrome", "Firefox", "Safari", "Opera", "Edge"];

const PLATFORMS: &[&str] = &[
    "Windows NT 10.0; Win64; x64",
    "Windows NT 6.1",
    "Windows NT 6.3",
    "Macintosh; Intel Mac OS X 10_15_7",
    "X11; Linux x86_64",
];

const CHROME_VERSIONS: &[&str] = &[
    "124.0.6367.118",
    "126.0.6478.126",
    "128.0.6613.137",
    "129.0.6668.100",
    "130.0.6723.116",
    "131.0.6778.85",
];

/// Build a random browser-like user agent string.
///
/// Only Chrome carries a version token; other browsers get a bare product
/// name so the string stays plausible without tracking every vendor's scheme.
pub fn random_user_agent() -> String {
    let mut rng = rand::thread_rng();
    let browser = BROWSERS.choose(&mut rng).copied().unwrap_or("Chrome");
    let platform = PLATFORMS.choose(&mut rng).copied().unwrap_or(PLATFORMS[0]);
    let product = if browser == "Chrome" {
        let version = CHROME_VERSIONS
            .choose(&mut rng)
            .copied()
            .unwrap_or(CHROME_VERSIONS[0]);
        format!("Chrome/{}", version)
    } else {
        browser.to_string()
    };

    format!(
        "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) {} Safari/537.36",
        platform, product
    )
}
