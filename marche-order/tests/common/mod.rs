#![allow(dead_code)]

use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;
use marche_catalog::{
    BoxRateTable, BoxWeights, DeliveryType, DiscountType, Experience, Product, Promotion, PromotionTarget, Shipping,
    ShippingRate,
};
use marche_core::{Address, PaymentMethod, Prefecture};
use marche_order::memory::{
    InMemoryOrderRepository, InMemoryProductRepository, InMemoryPromotionRepository, InMemoryShippingRepository,
    RecordingPublisher,
};
use marche_order::requests::{ExperienceOrderRequest, OrderLineRequest, PlaceOrderRequest};
use marche_order::{OrderManager, PromotionRepository, ShippingRepository, SettlementRules};
use marche_shared::Masked;

pub const TOKYO: u8 = 13;
pub const OKINAWA: u8 = 47;

pub struct Harness {
    pub manager: Arc<OrderManager>,
    pub orders: Arc<InMemoryOrderRepository>,
    pub promotions: Arc<InMemoryPromotionRepository>,
    pub shippings: Arc<InMemoryShippingRepository>,
    pub events: Arc<RecordingPublisher>,
    pub coordinator_id: Uuid,
    /// Normal, 250/120/50 units, 1500 each. Two fit a 60 box.
    pub apples: Product,
    /// Frozen, 200/100/40 units, 2500 each.
    pub fish: Product,
    /// Too big for any box.
    pub piano: Product,
    pub experience: Experience,
}

fn rates(mainland: i64, hokkaido: i64, okinawa: Option<i64>, surcharge: i64) -> BoxRateTable {
    let mut rates = vec![
        ShippingRate {
            number: 1,
            name: "Hokkaido".to_string(),
            price: hokkaido,
            prefectures: vec![Prefecture::new(1).unwrap()],
        },
        ShippingRate {
            number: 2,
            name: "Mainland".to_string(),
            price: mainland,
            prefectures: (2..=46).map(|code| Prefecture::new(code).unwrap()).collect(),
        },
    ];
    if let Some(price) = okinawa {
        rates.push(ShippingRate {
            number: 3,
            name: "Okinawa".to_string(),
            price,
            prefectures: vec![Prefecture::new(OKINAWA).unwrap()],
        });
    }
    BoxRateTable { rates, frozen_surcharge: surcharge }
}

/// Default shipping: 800/1000/1400 on the mainland, 300 frozen surcharge,
/// free from 10,000. `with_okinawa = false` leaves a coverage gap.
pub fn shipping(coordinator_id: Uuid, with_okinawa: bool) -> Shipping {
    let now = Utc::now();
    Shipping {
        id: Uuid::new_v4(),
        coordinator_id,
        name: "Standard".to_string(),
        is_default: true,
        box60: rates(800, 1200, with_okinawa.then_some(1500), 300),
        box80: rates(1000, 1500, with_okinawa.then_some(1800), 300),
        box100: rates(1400, 1900, with_okinawa.then_some(2200), 400),
        has_free_shipping: true,
        free_shipping_rates: 10_000,
        created_at: now,
        updated_at: now,
    }
}

fn product(coordinator_id: Uuid, name: &str, price: i64, delivery_type: DeliveryType, weights: BoxWeights) -> Product {
    Product {
        id: Uuid::new_v4(),
        coordinator_id,
        producer_id: Uuid::new_v4(),
        name: name.to_string(),
        price,
        delivery_type,
        box_weights: weights,
        is_public: true,
    }
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_shipping(true).await
    }

    pub async fn with_shipping(with_okinawa: bool) -> Self {
        let coordinator_id = Uuid::new_v4();
        let promotions = Arc::new(InMemoryPromotionRepository::new());
        let orders = Arc::new(InMemoryOrderRepository::with_promotions(promotions.clone()));
        let products = Arc::new(InMemoryProductRepository::new());
        let shippings = Arc::new(InMemoryShippingRepository::new());
        let events = Arc::new(RecordingPublisher::new());

        let apples = product(coordinator_id, "Apples", 1500, DeliveryType::Normal, BoxWeights::new(250, 120, 50));
        let fish = product(coordinator_id, "Yellowtail", 2500, DeliveryType::Frozen, BoxWeights::new(200, 100, 40));
        let piano = product(coordinator_id, "Piano", 300_000, DeliveryType::Normal, BoxWeights::new(700, 300, 200));
        let experience = Experience {
            id: Uuid::new_v4(),
            coordinator_id,
            title: "Strawberry picking".to_string(),
            adult_price: 3000,
            child_price: 1500,
            is_public: true,
        };
        products.insert(apples.clone()).await;
        products.insert(fish.clone()).await;
        products.insert(piano.clone()).await;
        products.insert_experience(experience.clone()).await;
        shippings.save(&shipping(coordinator_id, with_okinawa)).await.unwrap();

        let manager = Arc::new(OrderManager::new(
            orders.clone(),
            products,
            shippings.clone(),
            promotions.clone(),
            events.clone(),
            SettlementRules::default(),
        ));

        Self {
            manager,
            orders,
            promotions,
            shippings,
            events,
            coordinator_id,
            apples,
            fish,
            piano,
            experience,
        }
    }

    pub fn address(&self, prefecture: u8) -> Address {
        Address {
            lastname: Masked::from("Yamada"),
            firstname: Masked::from("Taro"),
            postal_code: "100-0001".to_string(),
            prefecture: Prefecture::new(prefecture).unwrap(),
            city: "Chiyoda-ku".to_string(),
            address_line1: "Chiyoda 1-1".to_string(),
            address_line2: None,
            phone_number: Masked::from("090-0000-0000"),
        }
    }

    pub fn request(&self, lines: &[(&Product, u32)], prefecture: u8) -> PlaceOrderRequest {
        PlaceOrderRequest {
            user_id: Uuid::new_v4(),
            coordinator_id: self.coordinator_id,
            items: lines
                .iter()
                .map(|(product, quantity)| OrderLineRequest { product_id: product.id, quantity: *quantity })
                .collect(),
            address: self.address(prefecture),
            payment_method: PaymentMethod::CreditCard,
            promotion_code: None,
            shipping_message: None,
        }
    }

    pub fn experience_request(&self, adults: u32, children: u32) -> ExperienceOrderRequest {
        ExperienceOrderRequest {
            user_id: Uuid::new_v4(),
            coordinator_id: self.coordinator_id,
            experience_id: self.experience.id,
            adult_count: adults,
            child_count: children,
            scheduled_on: NaiveDate::from_ymd_opt(2026, 12, 5).unwrap(),
            payment_method: PaymentMethod::CreditCard,
            promotion_code: None,
            remarks: Some("One wheelchair".to_string()),
        }
    }

    pub async fn add_promotion(&self, code: &str, discount_type: DiscountType, value: i64, limit: Option<i64>) -> Promotion {
        let now = Utc::now();
        let promotion = Promotion {
            id: Uuid::new_v4(),
            title: format!("Promotion {code}"),
            code: code.to_string(),
            public: true,
            target: PromotionTarget::Shop(self.coordinator_id),
            discount_type,
            discount_value: value,
            start_at: now - Duration::days(1),
            end_at: now + Duration::days(1),
            usage_limit: limit,
            used_count: 0,
            used_amount: 0,
            created_at: now,
            updated_at: now,
        };
        self.promotions.save(&promotion).await.unwrap();
        promotion
    }

    pub async fn promotion(&self, id: Uuid) -> Promotion {
        self.promotions.get(id).await.unwrap().unwrap()
    }
}
