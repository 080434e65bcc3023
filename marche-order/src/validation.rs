use std::collections::HashSet;
use std::fmt;
use marche_core::Address;
use crate::models::ShippingCarrier;
use crate::requests::{
    ExperienceOrderRequest, ExportRequest, FulfillmentUpdateRequest, PlaceOrderRequest, RefundRequest,
};

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_TRACKING_NUMBER_CHARS: usize = 32;
pub const MAX_PROMOTION_CODE_CHARS: usize = 32;
pub const MAX_QUANTITY: u32 = 999;
pub const MAX_PARTICIPANTS: u32 = 99;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Validation failed: {}", summary(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

fn summary(errors: &[FieldError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl ValidationErrors {
    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }
}

/// Accumulates field errors so callers see every problem at once.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(&mut self, ok: bool, field: impl Into<String>, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError {
                field: field.into(),
                message: message.to_string(),
            });
        }
        self
    }

    pub fn max_chars(&mut self, value: &str, max: usize, field: impl Into<String>) -> &mut Self {
        let ok = value.chars().count() <= max;
        self.require(ok, field, &format!("must be at most {} characters", max))
    }

    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.errors))
        }
    }
}

pub fn check_address(checks: &mut Checks, field: &str, address: &Address) {
    checks
        .require(!address.lastname.expose().trim().is_empty(), format!("{field}.lastname"), "is required")
        .require(!address.firstname.expose().trim().is_empty(), format!("{field}.firstname"), "is required")
        .require(address.has_valid_postal_code(), format!("{field}.postal_code"), "must be 7 digits")
        .require(!address.city.trim().is_empty(), format!("{field}.city"), "is required")
        .require(!address.address_line1.trim().is_empty(), format!("{field}.address_line1"), "is required")
        .require(!address.phone_number.expose().trim().is_empty(), format!("{field}.phone_number"), "is required");
}

fn check_promotion_code(checks: &mut Checks, code: Option<&str>) {
    if let Some(code) = code {
        checks
            .require(!code.trim().is_empty(), "promotion_code", "must not be blank")
            .max_chars(code, MAX_PROMOTION_CODE_CHARS, "promotion_code");
    }
}

pub fn validate_place_order(request: &PlaceOrderRequest) -> Result<(), ValidationErrors> {
    let mut checks = Checks::new();
    checks.require(!request.items.is_empty(), "items", "at least one item is required");

    let mut seen = HashSet::new();
    for (i, line) in request.items.iter().enumerate() {
        checks
            .require(line.quantity >= 1, format!("items[{i}].quantity"), "must be at least 1")
            .require(
                line.quantity <= MAX_QUANTITY,
                format!("items[{i}].quantity"),
                &format!("must be at most {}", MAX_QUANTITY),
            )
            .require(seen.insert(line.product_id), format!("items[{i}].product_id"), "is duplicated");
    }

    check_address(&mut checks, "address", &request.address);
    check_promotion_code(&mut checks, request.promotion_code.as_deref());
    if let Some(message) = &request.shipping_message {
        checks.max_chars(message, MAX_MESSAGE_CHARS, "shipping_message");
    }
    checks.finish()
}

pub fn validate_experience_order(request: &ExperienceOrderRequest) -> Result<(), ValidationErrors> {
    let mut checks = Checks::new();
    let participants = request.adult_count.saturating_add(request.child_count);
    checks
        .require(participants >= 1, "adult_count", "at least one participant is required")
        .require(
            participants <= MAX_PARTICIPANTS,
            "adult_count",
            &format!("at most {} participants per booking", MAX_PARTICIPANTS),
        );
    check_promotion_code(&mut checks, request.promotion_code.as_deref());
    if let Some(remarks) = &request.remarks {
        checks.max_chars(remarks, MAX_MESSAGE_CHARS, "remarks");
    }
    checks.finish()
}

pub fn validate_fulfillment_update(request: &FulfillmentUpdateRequest) -> Result<(), ValidationErrors> {
    let tracking = request.tracking_number.trim();
    let mut checks = Checks::new();
    checks
        .require(request.shipping_carrier != ShippingCarrier::Unknown, "shipping_carrier", "is required")
        .require(!tracking.is_empty(), "tracking_number", "is required")
        .require(
            tracking.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'),
            "tracking_number",
            "may only contain letters, digits and hyphens",
        )
        .max_chars(tracking, MAX_TRACKING_NUMBER_CHARS, "tracking_number");
    checks.finish()
}

pub fn validate_refund(request: &RefundRequest) -> Result<(), ValidationErrors> {
    let mut checks = Checks::new();
    checks
        .require(!request.description.trim().is_empty(), "description", "is required")
        .max_chars(&request.description, MAX_MESSAGE_CHARS, "description");
    checks.finish()
}

pub fn validate_export(request: &ExportRequest) -> Result<(), ValidationErrors> {
    let mut checks = Checks::new();
    checks.require(request.shipping_carrier != ShippingCarrier::Unknown, "shipping_carrier", "is required");
    checks.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{CharacterEncoding, OrderLineRequest};
    use marche_core::{PaymentMethod, Prefecture};
    use marche_shared::Masked;
    use rstest::rstest;
    use uuid::Uuid;

    fn address() -> Address {
        Address {
            lastname: Masked::from("Sato"),
            firstname: Masked::from("Hanako"),
            postal_code: "530-0001".to_string(),
            prefecture: Prefecture::new(27).unwrap(),
            city: "Osaka-shi Kita-ku".to_string(),
            address_line1: "Umeda 1-1".to_string(),
            address_line2: None,
            phone_number: Masked::from("06-0000-0000"),
        }
    }

    fn place_order(items: Vec<OrderLineRequest>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            user_id: Uuid::new_v4(),
            coordinator_id: Uuid::new_v4(),
            items,
            address: address(),
            payment_method: PaymentMethod::CreditCard,
            promotion_code: None,
            shipping_message: None,
        }
    }

    #[test]
    fn test_valid_order_passes() {
        let request = place_order(vec![OrderLineRequest { product_id: Uuid::new_v4(), quantity: 2 }]);
        assert!(validate_place_order(&request).is_ok());
    }

    #[test]
    fn test_collects_every_problem() {
        let product_id = Uuid::new_v4();
        let mut request = place_order(vec![
            OrderLineRequest { product_id, quantity: 0 },
            OrderLineRequest { product_id, quantity: 1 },
        ]);
        request.address.postal_code = "12".to_string();
        request.shipping_message = Some("a".repeat(MAX_MESSAGE_CHARS + 1));
        request.promotion_code = Some(" ".to_string());

        let errors = validate_place_order(&request).unwrap_err();
        assert_eq!(
            errors.fields(),
            vec![
                "items[0].quantity",
                "items[1].product_id",
                "address.postal_code",
                "promotion_code",
                "shipping_message",
            ]
        );
    }

    #[rstest]
    #[case(MAX_QUANTITY, true)]
    #[case(MAX_QUANTITY + 1, false)]
    #[case(u32::MAX, false)]
    fn test_quantity_upper_bound(#[case] quantity: u32, #[case] ok: bool) {
        let request = place_order(vec![OrderLineRequest { product_id: Uuid::new_v4(), quantity }]);
        match validate_place_order(&request) {
            Ok(()) => assert!(ok),
            Err(errors) => {
                assert!(!ok);
                assert_eq!(errors.fields(), vec!["items[0].quantity"]);
            }
        }
    }

    #[test]
    fn test_participant_counts_do_not_overflow() {
        let request = ExperienceOrderRequest {
            user_id: Uuid::new_v4(),
            coordinator_id: Uuid::new_v4(),
            experience_id: Uuid::new_v4(),
            adult_count: u32::MAX,
            child_count: 1,
            scheduled_on: chrono::NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            payment_method: PaymentMethod::CreditCard,
            promotion_code: None,
            remarks: None,
        };
        let errors = validate_experience_order(&request).unwrap_err();
        assert_eq!(errors.fields(), vec!["adult_count"]);
    }

    #[test]
    fn test_empty_order_is_rejected() {
        let errors = validate_place_order(&place_order(vec![])).unwrap_err();
        assert_eq!(errors.fields(), vec!["items"]);
    }

    #[test]
    fn test_message_limit_counts_characters_not_bytes() {
        let mut request = place_order(vec![OrderLineRequest { product_id: Uuid::new_v4(), quantity: 1 }]);
        request.shipping_message = Some("置き配".repeat(MAX_MESSAGE_CHARS / 3));
        assert!(validate_place_order(&request).is_ok());
    }

    #[test]
    fn test_fulfillment_update_requires_both_fields() {
        let request = FulfillmentUpdateRequest {
            shipping_carrier: ShippingCarrier::Unknown,
            tracking_number: "".to_string(),
        };
        let errors = validate_fulfillment_update(&request).unwrap_err();
        assert_eq!(errors.fields(), vec!["shipping_carrier", "tracking_number"]);

        let ok = FulfillmentUpdateRequest {
            shipping_carrier: ShippingCarrier::Yamato,
            tracking_number: "4321-0000-1111".to_string(),
        };
        assert!(validate_fulfillment_update(&ok).is_ok());
    }

    #[test]
    fn test_refund_description() {
        assert!(validate_refund(&RefundRequest { description: "Damaged in transit".to_string() }).is_ok());
        assert!(validate_refund(&RefundRequest { description: "   ".to_string() }).is_err());
        assert!(validate_refund(&RefundRequest { description: "x".repeat(MAX_MESSAGE_CHARS + 1) }).is_err());
    }

    #[test]
    fn test_export_needs_carrier() {
        let request = ExportRequest {
            shipping_carrier: ShippingCarrier::Unknown,
            encoding: CharacterEncoding::Utf8,
            coordinator_id: None,
        };
        assert!(validate_export(&request).is_err());
    }
}
