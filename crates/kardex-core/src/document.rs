//! # Loose Document Decoding
//!
//! Catalogue exports and older store snapshots hold records as loosely typed
//! JSON documents with the shop's camelCase keys. This module turns them into
//! the strict records the ledger works with.
//!
//! ## Coercion Rules
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────────────┐
//! │ Field kind           │ Accepted input → result                          │
//! ├──────────────────────┼──────────────────────────────────────────────────┤
//! │ quantity             │ 4, "4", 4.9, "4.9" → 4     missing/junk/neg → 0   │
//! │ price (major units)  │ 12.5, "12.50" → 1250 ¢     missing/junk/neg → 0   │
//! │ timestamp            │ RFC 3339 string, {seconds,nanoseconds},          │
//! │                      │ epoch milliseconds                               │
//! │ payment estado       │ missing → activo                                 │
//! │ lot estado           │ re-derived from stockRestante                    │
//! └──────────────────────┴──────────────────────────────────────────────────┘
//! ```
//!
//! Derived line-item money fields are recomputed, never trusted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{CoreResult, ValidationError};
use crate::types::{LineItem, Lot, LotStatus, Payment, PaymentMethod, PaymentStatus, Product};

// =============================================================================
// Coercion
// =============================================================================

/// Coerces a loose value to a non-negative integer quantity.
///
/// ## Example
/// ```rust
/// use kardex_core::document::coerce_quantity;
/// use serde_json::json;
///
/// assert_eq!(coerce_quantity(&json!("7")), 7);
/// assert_eq!(coerce_quantity(&json!(2.9)), 2);
/// assert_eq!(coerce_quantity(&json!(-3)), 0);
/// assert_eq!(coerce_quantity(&json!(null)), 0);
/// ```
pub fn coerce_quantity(value: &Value) -> i64 {
    let n = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(truncate))
        }
        _ => None,
    };
    n.unwrap_or(0).max(0)
}

/// Coerces a loose price in major units to non-negative cents.
///
/// ## Example
/// ```rust
/// use kardex_core::document::coerce_cents;
/// use serde_json::json;
///
/// assert_eq!(coerce_cents(&json!(12.5)), 1250);
/// assert_eq!(coerce_cents(&json!("0.99")), 99);
/// assert_eq!(coerce_cents(&json!(15)), 1500);
/// ```
pub fn coerce_cents(value: &Value) -> i64 {
    let major = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    major
        .filter(|m| m.is_finite())
        .map(|m| (m * 100.0).round() as i64)
        .unwrap_or(0)
        .max(0)
}

/// Coerces a loose timestamp.
pub fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        Value::Object(map) => {
            let seconds = map.get("seconds").or_else(|| map.get("_seconds"))?.as_i64()?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, u32::try_from(nanos).ok()?).single()
        }
        _ => None,
    }
}

fn truncate(f: f64) -> i64 {
    if f.is_finite() {
        f.trunc() as i64
    } else {
        0
    }
}

fn quantity<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(coerce_quantity(&Value::deserialize(d)?))
}

fn cents<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(coerce_cents(&Value::deserialize(d)?))
}

fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(coerce_timestamp(&Value::deserialize(d)?))
}

fn invalid(kind: &str, id: &str, err: serde_json::Error) -> ValidationError {
    ValidationError::InvalidFormat {
        field: format!("{kind} document {id}"),
        reason: err.to_string(),
    }
}

// =============================================================================
// Documents
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductDoc {
    nombre: String,
    #[serde(default)]
    marca: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    talla: Option<String>,
    #[serde(default)]
    ubicacion: Option<String>,
    #[serde(default, deserialize_with = "quantity")]
    stock_actual: i64,
    #[serde(default, deserialize_with = "cents")]
    precio_compra_default: i64,
    #[serde(default, deserialize_with = "cents")]
    precio_venta_minimo: i64,
    #[serde(default, deserialize_with = "cents")]
    precio_venta_default: i64,
    #[serde(default, deserialize_with = "timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LotDoc {
    producto_id: String,
    #[serde(default, deserialize_with = "timestamp")]
    fecha_ingreso: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "quantity")]
    cantidad_original: i64,
    #[serde(default, deserialize_with = "quantity")]
    stock_restante: i64,
    #[serde(default, deserialize_with = "cents")]
    precio_compra_unitario: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemDoc {
    producto_id: String,
    #[serde(default)]
    lote_id: Option<String>,
    #[serde(default, deserialize_with = "quantity")]
    cantidad: i64,
    #[serde(default, deserialize_with = "cents")]
    precio_venta: i64,
    #[serde(default, deserialize_with = "cents")]
    precio_compra: i64,
    #[serde(default, deserialize_with = "timestamp")]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentDoc {
    credito_id: String,
    #[serde(default)]
    cliente_id: Option<String>,
    #[serde(default, deserialize_with = "cents")]
    monto: i64,
    metodo_pago: PaymentMethod,
    #[serde(default)]
    estado: Option<PaymentStatus>,
    #[serde(default, deserialize_with = "timestamp")]
    fecha: Option<DateTime<Utc>>,
}

/// Decodes a product document (`nombre`, `stockActual`, `precioVentaMinimo`, ...).
pub fn decode_product(id: &str, doc: &Value) -> CoreResult<Product> {
    let raw = ProductDoc::deserialize(doc).map_err(|e| invalid("product", id, e))?;
    let created_at = raw.created_at.unwrap_or_default();

    Ok(Product {
        id: id.to_string(),
        name: raw.nombre,
        brand: raw.marca,
        color: raw.color,
        size: raw.talla,
        location_code: raw.ubicacion,
        stock_actual: raw.stock_actual,
        default_cost_cents: raw.precio_compra_default,
        min_sale_price_cents: raw.precio_venta_minimo,
        default_sale_price_cents: raw.precio_venta_default,
        created_at,
        updated_at: raw.updated_at.unwrap_or(created_at),
    })
}

/// Decodes a lot document. `fechaIngreso` is required: it is the FIFO key.
///
/// A missing `cantidadOriginal` falls back to `stockRestante`.
pub fn decode_lot(id: &str, doc: &Value) -> CoreResult<Lot> {
    let raw = LotDoc::deserialize(doc).map_err(|e| invalid("lot", id, e))?;
    let received_at = raw.fecha_ingreso.ok_or_else(|| ValidationError::Required {
        field: format!("lot {id} fechaIngreso"),
    })?;

    Ok(Lot {
        id: id.to_string(),
        product_id: raw.producto_id,
        received_at,
        original_quantity: raw.cantidad_original.max(raw.stock_restante),
        remaining_quantity: raw.stock_restante,
        unit_cost_cents: raw.precio_compra_unitario,
        status: LotStatus::for_remaining(raw.stock_restante),
    })
}

/// Decodes a line-item document belonging to `aggregate_id`.
pub fn decode_line_item(id: &str, aggregate_id: &str, doc: &Value) -> CoreResult<LineItem> {
    let raw = LineItemDoc::deserialize(doc).map_err(|e| invalid("line item", id, e))?;

    let mut item = LineItem {
        id: id.to_string(),
        aggregate_id: aggregate_id.to_string(),
        product_id: raw.producto_id,
        lot_id: raw.lote_id.filter(|l| !l.trim().is_empty()),
        quantity: raw.cantidad,
        unit_price_cents: raw.precio_venta,
        subtotal_cents: 0,
        unit_cost_cents: raw.precio_compra,
        unit_profit_cents: 0,
        total_profit_cents: 0,
        created_at: raw.created_at.unwrap_or_default(),
    };
    item.recompute()?;
    Ok(item)
}

/// Decodes a payment (abono) document. A missing `estado` means `activo`.
pub fn decode_payment(id: &str, doc: &Value) -> CoreResult<Payment> {
    let raw = PaymentDoc::deserialize(doc).map_err(|e| invalid("payment", id, e))?;

    Ok(Payment {
        id: id.to_string(),
        aggregate_id: raw.credito_id,
        customer_id: raw.cliente_id,
        amount_cents: raw.monto,
        method: raw.metodo_pago,
        status: raw.estado.unwrap_or_default(),
        created_at: raw.fecha.unwrap_or_default(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use serde_json::json;

    #[test]
    fn test_quantity_coercion() {
        assert_eq!(coerce_quantity(&json!(5)), 5);
        assert_eq!(coerce_quantity(&json!(" 12 ")), 12);
        assert_eq!(coerce_quantity(&json!("3.7")), 3);
        assert_eq!(coerce_quantity(&json!("many")), 0);
        assert_eq!(coerce_quantity(&json!(true)), 0);
        assert_eq!(coerce_quantity(&json!("-4")), 0);
    }

    #[test]
    fn test_cents_coercion() {
        assert_eq!(coerce_cents(&json!(10.99)), 1099);
        assert_eq!(coerce_cents(&json!("7")), 700);
        assert_eq!(coerce_cents(&json!(-1.5)), 0);
        assert_eq!(coerce_cents(&json!({})), 0);
    }

    #[test]
    fn test_timestamp_coercion() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(coerce_timestamp(&json!("2024-05-01T12:00:00Z")), Some(expected));
        assert_eq!(
            coerce_timestamp(&json!({ "seconds": expected.timestamp(), "nanoseconds": 0 })),
            Some(expected)
        );
        assert_eq!(
            coerce_timestamp(&json!({ "_seconds": expected.timestamp() })),
            Some(expected)
        );
        assert_eq!(coerce_timestamp(&json!(expected.timestamp_millis())), Some(expected));
        assert_eq!(coerce_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn test_decode_product() {
        let doc = json!({
            "nombre": "Filtro de aceite",
            "marca": "Bosch",
            "ubicacion": "A-03",
            "stockActual": "12",
            "precioCompraDefault": 8.5,
            "precioVentaMinimo": "11",
            "precioVentaDefault": 14.99
        });
        let product = decode_product("FILTRO-01", &doc).unwrap();
        assert_eq!(product.id, "FILTRO-01");
        assert_eq!(product.brand.as_deref(), Some("Bosch"));
        assert_eq!(product.location_code.as_deref(), Some("A-03"));
        assert_eq!(product.stock_actual, 12);
        assert_eq!(product.default_cost_cents, 850);
        assert_eq!(product.min_sale_price_cents, 1100);
        assert_eq!(product.default_sale_price_cents, 1499);
    }

    #[test]
    fn test_decode_product_requires_name() {
        let err = decode_product("P", &json!({ "stockActual": 1 })).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_decode_lot_derives_status() {
        let doc = json!({
            "productoId": "FILTRO-01",
            "fechaIngreso": "2024-02-10T08:30:00Z",
            "cantidadOriginal": 10,
            "stockRestante": 0,
            "precioCompraUnitario": "9.25",
            "estado": "activo"
        });
        let lot = decode_lot("L7", &doc).unwrap();
        assert_eq!(lot.remaining_quantity, 0);
        assert_eq!(lot.status, LotStatus::Depleted);
        assert_eq!(lot.unit_cost_cents, 925);
        assert_eq!(lot.original_quantity, 10);
    }

    #[test]
    fn test_decode_lot_requires_intake_date() {
        let doc = json!({ "productoId": "P", "stockRestante": 3 });
        assert!(matches!(
            decode_lot("L1", &doc),
            Err(CoreError::Validation(ValidationError::Required { .. }))
        ));
    }

    #[test]
    fn test_decode_line_item_recomputes_money() {
        let doc = json!({
            "productoId": "P",
            "loteId": "",
            "cantidad": "3",
            "precioVenta": 20,
            "precioCompra": 12,
            "subtotal": 999999
        });
        let item = decode_line_item("i1", "Q1", &doc).unwrap();
        assert_eq!(item.lot_id, None);
        assert_eq!(item.subtotal_cents, 6000);
        assert_eq!(item.total_profit_cents, 2400);
    }

    #[test]
    fn test_decode_line_item_rejects_overflowing_amount() {
        let doc = json!({
            "productoId": "P",
            "cantidad": 3,
            "precioVenta": 1.0e17,
            "precioCompra": 0
        });
        let err = decode_line_item("i1", "Q1", &doc).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_decode_payment_defaults_to_active() {
        let doc = json!({ "creditoId": "K1", "monto": 40, "metodoPago": "efectivo" });
        let payment = decode_payment("A1", &doc).unwrap();
        assert_eq!(payment.status, PaymentStatus::Active);
        assert_eq!(payment.amount_cents, 4000);
        assert_eq!(payment.method, PaymentMethod::Cash);

        let doc = json!({ "creditoId": "K1", "monto": 40, "metodoPago": "tarjeta", "estado": "cancelado" });
        assert_eq!(decode_payment("A2", &doc).unwrap().status, PaymentStatus::Cancelled);

        let doc = json!({ "creditoId": "K1", "monto": 40, "metodoPago": "cheque" });
        assert!(decode_payment("A3", &doc).is_err());
    }
}
