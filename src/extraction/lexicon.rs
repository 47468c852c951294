use crate::models::Currency;

/// Markers checked in priority order; the first currency whose marker occurs
/// in the token wins.
const MARKERS: &[(Currency, &[&str])] = &[
    (Currency::Rub, &["₽", "руб"]),
    (Currency::Usd, &["$", "usd"]),
    (Currency::Eur, &["€", "eur"]),
    (Currency::Uah, &["₴", "грн"]),
    (Currency::Kzt, &["₸", "тенге"]),
    (Currency::Byn, &["byn"]),
];

/// Classifies a piece of text by the currency markers it contains.
pub fn classify(token: &str) -> Currency {
    let token = token.to_lowercase();
    MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| token.contains(m)))
        .map(|(currency, _)| *currency)
        .unwrap_or(Currency::Unk)
}
