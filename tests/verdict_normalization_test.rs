use goahead::domain::verdict::{CanonicalVerdict, VerdictNormalizer};

#[test]
fn test_documented_verdict_mappings() {
    let normalizer = VerdictNormalizer::new();

    assert_eq!(
        normalizer.normalize("options_agent", "EXECUTE"),
        CanonicalVerdict::StrongBuy
    );
    assert_eq!(
        normalizer.normalize("equity_agent", "SELL"),
        CanonicalVerdict::Cautious
    );
    assert_eq!(
        normalizer.normalize("unknown_agent", "gibberish"),
        CanonicalVerdict::Hold
    );
}

#[test]
fn test_agent_key_and_table_name_are_equivalent() {
    let normalizer = VerdictNormalizer::new();
    for raw in ["EXECUTE", "sell", "  Bullish ", "MODEL_STABLE"] {
        let short = normalizer.normalize("options", raw);
        let long = normalizer.normalize("options_agent", raw);
        assert_eq!(short, long, "mismatch for {:?}", raw);
    }
}

#[test]
fn test_arbitrary_input_always_maps_to_the_scale() {
    let normalizer = VerdictNormalizer::new();
    let agents = ["equity", "options_agent", "sentiment", "trainer", "", "???"];
    let raws = [
        "",
        "   ",
        "buy",
        "STRONG SELL",
        "very bullish!!",
        "high risk",
        "danger zone",
        "negative outlook",
        "ünïcödé ☂",
        "\u{0}\u{1f}",
        "HOLD_OR_BUY_OR_SELL",
        "x".repeat(4096).as_str(),
    ]
    .map(str::to_string);

    for agent in agents {
        for raw in &raws {
            let verdict = normalizer.normalize(agent, raw);
            assert!(CanonicalVerdict::ALL.contains(&verdict));
        }
    }

    assert_eq!(normalizer.normalize("equity", "   "), CanonicalVerdict::Hold);
    assert_eq!(
        normalizer.normalize("nobody", "very bullish!!"),
        CanonicalVerdict::StrongBuy
    );
    assert_eq!(
        normalizer.normalize("nobody", "danger zone"),
        CanonicalVerdict::Avoid
    );
}

#[test]
fn test_empty_normalizer_falls_back_to_heuristics() {
    let normalizer = VerdictNormalizer::empty();
    assert_eq!(normalizer.normalize("options", "EXECUTE"), CanonicalVerdict::Hold);
    assert_eq!(normalizer.normalize("options", "BUY"), CanonicalVerdict::Buy);
    assert_eq!(normalizer.normalize("options", "SELL"), CanonicalVerdict::Cautious);
}
