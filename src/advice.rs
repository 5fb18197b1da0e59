//! Fixed advisory text for each market sentiment label.

use serde::Serialize;

/// Advisory tuple attached to a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub advice: &'static str,
    pub glyph: &'static str,
    pub category: &'static str,
}

/// Sentiment labels the dataset uses, ordered from most fearful to most greedy.
pub const SENTIMENT_LABELS: [&str; 5] = ["Extreme Fear", "Fear", "Neutral", "Greed", "Extreme Greed"];

const UNKNOWN: Advice = Advice {
    advice: "Unknown sentiment",
    glyph: "❓",
    category: "",
};

/// Map a sentiment label to its advice. Labels outside [`SENTIMENT_LABELS`] map to
/// the "unknown sentiment" tuple.
pub fn advice_for(label: &str) -> Advice {
    match label {
        "Extreme Fear" => Advice {
            advice: "Buy the dip → STRONG BUY",
            glyph: "🔥",
            category: "extreme-fear",
        },
        "Fear" => Advice {
            advice: "Good entry point → BUY",
            glyph: "😰",
            category: "fear",
        },
        "Neutral" => Advice {
            advice: "Market stable → HOLD",
            glyph: "😐",
            category: "neutral",
        },
        "Greed" => Advice {
            advice: "Consider taking profits",
            glyph: "😎",
            category: "greed",
        },
        "Extreme Greed" => Advice {
            advice: "Sell high → SELL",
            glyph: "🤑",
            category: "extreme-greed",
        },
        _ => UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_known_label_has_its_own_category() {
        let categories: Vec<&str> = SENTIMENT_LABELS
            .iter()
            .map(|label| advice_for(label).category)
            .collect();
        assert_eq!(
            categories,
            vec!["extreme-fear", "fear", "neutral", "greed", "extreme-greed"]
        );
        assert!(SENTIMENT_LABELS.iter().all(|label| advice_for(label) != UNKNOWN));
    }

    #[test]
    fn unrecognised_labels_map_to_unknown() {
        assert_eq!(advice_for("fear"), UNKNOWN);
        assert_eq!(advice_for(""), UNKNOWN);
        assert_eq!(advice_for("Panic").advice, "Unknown sentiment");
    }
}
