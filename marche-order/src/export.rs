//! Shipping-label CSV for carrier upload tools.

use std::io::Write;
use marche_catalog::DeliveryType;
use marche_core::PaymentMethod;
use crate::models::{Order, OrderFulfillment, OrderStatus, ShippingCarrier};
use crate::requests::{CharacterEncoding, ExportRequest};
use crate::validation::{validate_export, ValidationErrors};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const YAMATO_HEADER: &[&str] = &[
    "customer_reference",
    "shipment_type",
    "cool_type",
    "recipient_phone",
    "recipient_postal_code",
    "recipient_address",
    "recipient_address_line2",
    "recipient_name",
    "item_name",
    "box_size",
    "note",
];

const SAGAWA_HEADER: &[&str] = &[
    "reference_no",
    "recipient_name",
    "recipient_postal_code",
    "recipient_prefecture",
    "recipient_address",
    "recipient_phone",
    "package_count",
    "item_name",
    "cool_flag",
];

const JAPAN_POST_HEADER: &[&str] = &[
    "order_id",
    "box_number",
    "recipient_name",
    "recipient_postal_code",
    "recipient_address",
    "recipient_phone",
    "item_description",
    "temperature",
    "message",
];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Export output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Boxes still waiting for a tracking number.
fn pending_boxes<'a>(
    orders: &'a [Order],
    request: &'a ExportRequest,
) -> impl Iterator<Item = (&'a Order, &'a OrderFulfillment)> + 'a {
    orders
        .iter()
        .filter(move |order| order.status == OrderStatus::Preparing)
        .filter(move |order| request.coordinator_id.map_or(true, |id| id == order.coordinator_id))
        .flat_map(|order| {
            order
                .fulfillments
                .iter()
                .filter(|f| !f.is_fulfilled())
                .map(move |f| (order, f))
        })
}

fn item_summary(order: &Order, fulfillment: &OrderFulfillment) -> String {
    order
        .items_in(fulfillment.id)
        .map(|item| format!("{} x{}", item.product_name, item.quantity))
        .collect::<Vec<_>>()
        .join(" / ")
}

fn row(carrier: ShippingCarrier, order: &Order, fulfillment: &OrderFulfillment) -> Vec<String> {
    let address = &fulfillment.address;
    let reference = format!("{}-{}", order.id, fulfillment.box_number);
    let note = order.shipping_message.clone().unwrap_or_default();

    match carrier {
        ShippingCarrier::Yamato => vec![
            reference,
            // 0: prepaid, 2: collect on delivery
            (if order.payment.method == PaymentMethod::CashOnDelivery { "2" } else { "0" }).to_string(),
            match fulfillment.delivery_type {
                DeliveryType::Normal => "0",
                DeliveryType::Frozen => "1",
                DeliveryType::Refrigerated => "2",
            }
            .to_string(),
            address.phone_number.expose().clone(),
            address.normalized_postal_code(),
            format!("{}{}{}", address.prefecture.name(), address.city, address.address_line1),
            address.address_line2.clone().unwrap_or_default(),
            address.recipient_name(),
            item_summary(order, fulfillment),
            fulfillment.box_size.to_string(),
            note,
        ],
        ShippingCarrier::Sagawa => vec![
            reference,
            address.recipient_name(),
            address.normalized_postal_code(),
            address.prefecture.name().to_string(),
            address.street(),
            address.phone_number.expose().clone(),
            "1".to_string(),
            item_summary(order, fulfillment),
            match fulfillment.delivery_type {
                DeliveryType::Normal => "",
                DeliveryType::Refrigerated => "REFRIGERATED",
                DeliveryType::Frozen => "FROZEN",
            }
            .to_string(),
        ],
        ShippingCarrier::JapanPost | ShippingCarrier::Unknown => vec![
            order.id.to_string(),
            fulfillment.box_number.to_string(),
            address.recipient_name(),
            address.postal_code.clone(),
            format!("{} {}", address.prefecture.name(), address.street()),
            address.phone_number.expose().clone(),
            item_summary(order, fulfillment),
            fulfillment.delivery_type.as_str().to_string(),
            note,
        ],
    }
}

/// Write one row per unfulfilled box of every preparing order. Returns the
/// number of rows written.
pub fn export_orders<W: Write>(orders: &[Order], request: &ExportRequest, mut out: W) -> Result<usize, ExportError> {
    validate_export(request)?;

    if request.encoding == CharacterEncoding::Utf8Bom {
        out.write_all(UTF8_BOM)?;
    }

    let header = match request.shipping_carrier {
        ShippingCarrier::Yamato => YAMATO_HEADER,
        ShippingCarrier::Sagawa => SAGAWA_HEADER,
        ShippingCarrier::JapanPost | ShippingCarrier::Unknown => JAPAN_POST_HEADER,
    };

    let mut writer = csv::WriterBuilder::new().terminator(csv::Terminator::CRLF).from_writer(out);
    writer.write_record(header)?;

    let mut rows = 0;
    for (order, fulfillment) in pending_boxes(orders, request) {
        writer.write_record(row(request.shipping_carrier, order, fulfillment))?;
        rows += 1;
    }
    writer.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FulfillmentStatus, OrderItem, OrderPayment, OrderType, ShippingMethod};
    use marche_catalog::{BoxSize, Discount};
    use marche_core::{Address, Prefecture};
    use marche_shared::Masked;
    use uuid::Uuid;

    fn order(status: OrderStatus, boxes: &[FulfillmentStatus]) -> Order {
        let payment = OrderPayment::new(PaymentMethod::CreditCard, 2000, 900, Discount::default(), 10);
        let mut order = Order::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), OrderType::Product, payment);
        order.status = status;
        for (i, box_status) in boxes.iter().enumerate() {
            let fid = Uuid::new_v4();
            order.fulfillments.push(OrderFulfillment {
                id: fid,
                order_id: order.id,
                box_number: i as u32 + 1,
                box_size: BoxSize::Size80,
                box_rate: 40,
                delivery_type: DeliveryType::Frozen,
                status: *box_status,
                shipping_carrier: ShippingCarrier::Unknown,
                tracking_number: None,
                shipping_method: ShippingMethod::Standard,
                shipping_fee: 900,
                shipped_at: None,
                address: Address {
                    lastname: Masked::from("Ito"),
                    firstname: Masked::from("Ken"),
                    postal_code: "900-0001".to_string(),
                    prefecture: Prefecture::new(47).unwrap(),
                    city: "Naha-shi".to_string(),
                    address_line1: "Minatomachi 1".to_string(),
                    address_line2: Some("Room 2".to_string()),
                    phone_number: Masked::from("098-000-0000"),
                },
            });
            order.items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                fulfillment_id: fid,
                product_id: Uuid::new_v4(),
                product_name: "Mango".to_string(),
                price: 1000,
                quantity: 2,
            });
        }
        order
    }

    fn request(carrier: ShippingCarrier, encoding: CharacterEncoding) -> ExportRequest {
        ExportRequest {
            shipping_carrier: carrier,
            encoding,
            coordinator_id: None,
        }
    }

    #[test]
    fn test_only_pending_boxes_of_preparing_orders() {
        let orders = vec![
            order(OrderStatus::Preparing, &[FulfillmentStatus::Unfulfilled, FulfillmentStatus::Fulfilled]),
            order(OrderStatus::Unpaid, &[FulfillmentStatus::Unfulfilled]),
            order(OrderStatus::Preparing, &[FulfillmentStatus::Unfulfilled]),
        ];
        let mut buf = Vec::new();
        let rows = export_orders(&orders, &request(ShippingCarrier::Yamato, CharacterEncoding::Utf8), &mut buf).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("customer_reference,"));
        assert!(lines[1].contains("Okinawa"));
        assert!(lines[1].contains("Mango x2"));
        assert!(lines[1].contains(",9000001,"));
    }

    #[test]
    fn test_bom_prefix() {
        let orders = vec![order(OrderStatus::Preparing, &[FulfillmentStatus::Unfulfilled])];
        let mut buf = Vec::new();
        export_orders(&orders, &request(ShippingCarrier::JapanPost, CharacterEncoding::Utf8Bom), &mut buf).unwrap();
        assert!(buf.starts_with(UTF8_BOM));
        let text = std::str::from_utf8(&buf[UTF8_BOM.len()..]).unwrap();
        assert!(text.starts_with("order_id,box_number,"));
        assert!(text.contains("FROZEN"));
    }

    #[test]
    fn test_columns_follow_carrier() {
        let orders = vec![order(OrderStatus::Preparing, &[FulfillmentStatus::Unfulfilled])];
        let mut buf = Vec::new();
        export_orders(&orders, &request(ShippingCarrier::Sagawa, CharacterEncoding::Utf8), &mut buf).unwrap();

        let mut reader = csv::Reader::from_reader(buf.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), SAGAWA_HEADER.len());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[1], "Ito Ken");
        assert_eq!(&record[8], "FROZEN");
    }

    #[test]
    fn test_unknown_carrier_rejected() {
        let mut buf = Vec::new();
        let err = export_orders(&[], &request(ShippingCarrier::Unknown, CharacterEncoding::Utf8), &mut buf).unwrap_err();
        assert!(matches!(err, ExportError::Validation(_)));
        assert!(buf.is_empty());
    }
}
