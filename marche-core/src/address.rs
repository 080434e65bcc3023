use serde::{Deserialize, Serialize};
use marche_shared::Masked;
use crate::CoreError;

pub const PREFECTURE_COUNT: u8 = 47;

const PREFECTURE_NAMES: [&str; PREFECTURE_COUNT as usize] = [
    "Hokkaido", "Aomori", "Iwate", "Miyagi", "Akita", "Yamagata", "Fukushima",
    "Ibaraki", "Tochigi", "Gunma", "Saitama", "Chiba", "Tokyo", "Kanagawa",
    "Niigata", "Toyama", "Ishikawa", "Fukui", "Yamanashi", "Nagano", "Gifu",
    "Shizuoka", "Aichi", "Mie", "Shiga", "Kyoto", "Osaka", "Hyogo", "Nara",
    "Wakayama", "Tottori", "Shimane", "Okayama", "Hiroshima", "Yamaguchi",
    "Tokushima", "Kagawa", "Ehime", "Kochi", "Fukuoka", "Saga", "Nagasaki",
    "Kumamoto", "Oita", "Miyazaki", "Kagoshima", "Okinawa",
];

/// JIS X 0401 prefecture code (1 = Hokkaido ... 47 = Okinawa).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Prefecture(u8);

impl Prefecture {
    pub fn new(code: u8) -> Result<Self, CoreError> {
        if (1..=PREFECTURE_COUNT).contains(&code) {
            Ok(Self(code))
        } else {
            Err(CoreError::InvalidPrefecture(code))
        }
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn name(self) -> &'static str {
        PREFECTURE_NAMES[(self.0 - 1) as usize]
    }

    /// All 47 prefectures in code order.
    pub fn all() -> impl Iterator<Item = Prefecture> {
        (1..=PREFECTURE_COUNT).map(Prefecture)
    }
}

impl TryFrom<u8> for Prefecture {
    type Error = CoreError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl From<Prefecture> for u8 {
    fn from(prefecture: Prefecture) -> Self {
        prefecture.0
    }
}

impl std::fmt::Display for Prefecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{}", self.0, self.name())
    }
}

/// Delivery destination owned by a fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub lastname: Masked<String>,
    pub firstname: Masked<String>,
    pub postal_code: String,
    pub prefecture: Prefecture,
    pub city: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub phone_number: Masked<String>,
}

impl Address {
    /// Postal code with the hyphen removed, e.g. `1000001`.
    pub fn normalized_postal_code(&self) -> String {
        self.postal_code.chars().filter(|c| *c != '-').collect()
    }

    pub fn has_valid_postal_code(&self) -> bool {
        let digits = self.normalized_postal_code();
        digits.len() == 7 && digits.chars().all(|c| c.is_ascii_digit())
    }

    pub fn recipient_name(&self) -> String {
        format!("{} {}", self.lastname.expose(), self.firstname.expose())
    }

    /// Street part printed on shipping labels.
    pub fn street(&self) -> String {
        match &self.address_line2 {
            Some(line2) if !line2.is_empty() => format!("{}{} {}", self.city, self.address_line1, line2),
            _ => format!("{}{}", self.city, self.address_line1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tokyo_address(postal_code: &str) -> Address {
        Address {
            lastname: Masked::from("Yamada"),
            firstname: Masked::from("Taro"),
            postal_code: postal_code.to_string(),
            prefecture: Prefecture::new(13).unwrap(),
            city: "Chiyoda-ku".to_string(),
            address_line1: "1-1".to_string(),
            address_line2: None,
            phone_number: Masked::from("090-0000-0000"),
        }
    }

    #[rstest]
    #[case(0, false)]
    #[case(1, true)]
    #[case(47, true)]
    #[case(48, false)]
    fn test_prefecture_range(#[case] code: u8, #[case] valid: bool) {
        assert_eq!(Prefecture::new(code).is_ok(), valid);
    }

    #[test]
    fn test_prefecture_all_and_names() {
        let all: Vec<Prefecture> = Prefecture::all().collect();
        assert_eq!(all.len(), 47);
        assert_eq!(all[0].name(), "Hokkaido");
        assert_eq!(all[12].name(), "Tokyo");
        assert_eq!(all[46].name(), "Okinawa");
    }

    #[test]
    fn test_prefecture_deserialize_rejects_out_of_range() {
        let ok: Prefecture = serde_json::from_str("13").unwrap();
        assert_eq!(ok.code(), 13);
        assert!(serde_json::from_str::<Prefecture>("99").is_err());
    }

    #[rstest]
    #[case("100-0001", true)]
    #[case("1000001", true)]
    #[case("100-001", false)]
    #[case("ABC-DEFG", false)]
    fn test_postal_code(#[case] postal_code: &str, #[case] valid: bool) {
        assert_eq!(tokyo_address(postal_code).has_valid_postal_code(), valid);
    }

    #[test]
    fn test_debug_masks_personal_fields() {
        let debug = format!("{:?}", tokyo_address("100-0001"));
        assert!(!debug.contains("Yamada"));
        assert!(!debug.contains("090-0000-0000"));
        assert!(debug.contains("Chiyoda-ku"));
    }
}
