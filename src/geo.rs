//! Phone number geolocation
//!
//! Maps NANP numbers to a region code via their area code and supplies a
//! coarse UTC offset per region so contact tracking can bucket events into
//! the lead's local time of day. Stateless lookups only.

use chrono::{DateTime, FixedOffset, Utc};

/// Strip a phone number down to its national digits.
///
/// Accepts any formatting (`+1 (415) 555-0100`, `14155550100`, `4155550100`)
/// and returns the bare 10-digit national number when a leading country code
/// is present. Non-NANP numbers come back as their digit string unchanged.
pub fn normalize_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

/// Region code (US state / territory) for a phone number, from its area code.
pub fn region_for_number(raw: &str) -> Option<&'static str> {
    let digits = normalize_number(raw);
    if digits.len() < 10 {
        return None;
    }
    region_for_area_code(&digits[..3])
}

fn region_for_area_code(code: &str) -> Option<&'static str> {
    let region = match code {
        "205" | "251" | "256" | "334" | "938" => "AL",
        "907" => "AK",
        "480" | "520" | "602" | "623" | "928" => "AZ",
        "479" | "501" | "870" => "AR",
        "209" | "213" | "279" | "310" | "323" | "341" | "408" | "415" | "424" | "442" | "510"
        | "530" | "559" | "562" | "619" | "626" | "628" | "650" | "657" | "661" | "669" | "707"
        | "714" | "747" | "760" | "805" | "818" | "820" | "831" | "840" | "858" | "909" | "916"
        | "925" | "949" | "951" => "CA",
        "303" | "719" | "720" | "970" => "CO",
        "203" | "475" | "860" | "959" => "CT",
        "302" => "DE",
        "239" | "305" | "321" | "352" | "386" | "407" | "561" | "727" | "754" | "772" | "786"
        | "813" | "850" | "863" | "904" | "941" | "954" => "FL",
        "229" | "404" | "470" | "478" | "678" | "706" | "762" | "770" | "912" | "943" => "GA",
        "808" => "HI",
        "208" | "986" => "ID",
        "217" | "224" | "309" | "312" | "331" | "618" | "630" | "708" | "773" | "779" | "815"
        | "847" | "872" => "IL",
        "219" | "260" | "317" | "463" | "574" | "765" | "812" | "930" => "IN",
        "319" | "515" | "563" | "641" | "712" => "IA",
        "316" | "620" | "785" | "913" => "KS",
        "270" | "364" | "502" | "606" | "859" => "KY",
        "225" | "318" | "337" | "504" | "985" => "LA",
        "207" => "ME",
        "227" | "240" | "301" | "410" | "443" | "667" => "MD",
        "339" | "351" | "413" | "508" | "617" | "774" | "781" | "857" | "978" => "MA",
        "231" | "248" | "269" | "313" | "517" | "586" | "616" | "734" | "810" | "906" | "947"
        | "989" => "MI",
        "218" | "320" | "507" | "612" | "651" | "763" | "952" => "MN",
        "228" | "601" | "662" | "769" => "MS",
        "314" | "417" | "573" | "636" | "660" | "816" => "MO",
        "406" => "MT",
        "308" | "402" | "531" => "NE",
        "702" | "725" | "775" => "NV",
        "603" => "NH",
        "201" | "551" | "609" | "640" | "732" | "848" | "856" | "862" | "908" | "973" => "NJ",
        "505" | "575" => "NM",
        "212" | "315" | "332" | "347" | "516" | "518" | "585" | "607" | "631" | "646" | "680"
        | "716" | "718" | "838" | "845" | "914" | "917" | "929" | "934" => "NY",
        "252" | "336" | "704" | "743" | "828" | "910" | "919" | "980" | "984" => "NC",
        "701" => "ND",
        "216" | "220" | "234" | "283" | "326" | "330" | "380" | "419" | "440" | "513" | "567"
        | "614" | "740" | "937" => "OH",
        "405" | "539" | "580" | "918" => "OK",
        "458" | "503" | "541" | "971" => "OR",
        "215" | "223" | "267" | "272" | "412" | "445" | "484" | "570" | "582" | "610" | "717"
        | "724" | "814" | "835" | "878" => "PA",
        "401" => "RI",
        "803" | "839" | "843" | "854" | "864" => "SC",
        "605" => "SD",
        "423" | "615" | "629" | "731" | "865" | "901" | "931" => "TN",
        "210" | "214" | "254" | "281" | "325" | "346" | "361" | "409" | "430" | "432" | "469"
        | "512" | "682" | "713" | "726" | "737" | "806" | "817" | "830" | "832" | "903" | "915"
        | "936" | "940" | "956" | "972" | "979" => "TX",
        "385" | "435" | "801" => "UT",
        "802" => "VT",
        "276" | "434" | "540" | "571" | "703" | "757" | "804" | "826" | "948" => "VA",
        "206" | "253" | "360" | "425" | "509" | "564" => "WA",
        "202" => "DC",
        "304" | "681" => "WV",
        "262" | "414" | "534" | "608" | "715" | "920" => "WI",
        "307" => "WY",
        _ => return None,
    };
    Some(region)
}

/// Standard-time UTC offset (hours) per region.
///
/// Coarse by design: split-timezone states get their dominant offset and DST
/// is ignored. Good enough for bucketing a call into morning/afternoon/evening.
pub fn utc_offset_hours(region: &str) -> i32 {
    match region {
        "CT" | "DE" | "DC" | "FL" | "GA" | "IN" | "ME" | "MD" | "MA" | "MI" | "NH" | "NJ"
        | "NY" | "NC" | "OH" | "PA" | "RI" | "SC" | "VT" | "VA" | "WV" | "KY" => -5,
        "AL" | "AR" | "IL" | "IA" | "KS" | "LA" | "MN" | "MS" | "MO" | "NE" | "ND" | "OK"
        | "SD" | "TN" | "TX" | "WI" => -6,
        "AZ" | "CO" | "ID" | "MT" | "NM" | "UT" | "WY" => -7,
        "CA" | "NV" | "OR" | "WA" => -8,
        "AK" => -9,
        "HI" => -10,
        _ => 0,
    }
}

/// A UTC timestamp shifted to the region's local wall clock.
pub fn local_time(ts: DateTime<Utc>, region: Option<&str>) -> DateTime<FixedOffset> {
    let hours = region.map(utc_offset_hours).unwrap_or(0);
    let offset =
        FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    ts.with_timezone(&offset)
}
