/// The closed set of people-search providers the router chooses among.
/// Order is not significant to selection (scoring decides that) but is used
/// as the tie-break for deterministic tests.
pub const MAGAZINE: &[&str] = &[
    "FastPeopleSearch",
    "TruePeopleSearch",
    "ZabaSearch",
    "SearchPeopleFree",
    "ThatsThem",
    "AnyWho",
];

/// Used when every provider is ineligible (all tried, all blacklisted) so
/// `select_provider` never returns nothing — unlike `get_next_provider`,
/// which legitimately returns `None` once providers are exhausted.
pub fn default_provider() -> &'static str {
    "TruePeopleSearch"
}

pub fn domain_for_provider(provider: &str) -> Option<&'static str> {
    match provider {
        "FastPeopleSearch" => Some("fastpeoplesearch.com"),
        "TruePeopleSearch" => Some("truepeoplesearch.com"),
        "ZabaSearch" => Some("zabasearch.com"),
        "SearchPeopleFree" => Some("searchpeoplefree.com"),
        "ThatsThem" => Some("thatsthem.com"),
        "AnyWho" => Some("anywho.com"),
        _ => None,
    }
}
