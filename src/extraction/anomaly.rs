/// URL fragments of interstitial challenge pages.
const URL_MARKERS: &[&str] = &["/sorry/", "showcaptcha", "/captcha"];

/// Content fragments, matched case-insensitively against the raw markup.
const CONTENT_MARKERS: &[&str] = &[
    "g-recaptcha",
    "h-captcha",
    "cf-challenge",
    "challenge-form",
    "unusual traffic from your computer network",
    "our systems have detected unusual traffic",
    "подтвердите, что запросы отправляли вы, а не робот",
    // Yandex SmartCaptcha widget
    "checkboxcaptcha",
    "smartcaptcha",
];

/// Whether a loaded page is a bot-check instead of a results page.
pub fn is_challenge_page(url: &str, html: &str) -> bool {
    let url = url.to_lowercase();
    if URL_MARKERS.iter().any(|m| url.contains(m)) {
        return true;
    }
    let html = html.to_lowercase();
    CONTENT_MARKERS.iter().any(|m| html.contains(m))
}
