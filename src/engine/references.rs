use chrono::{DateTime, Utc};
use uuid::Uuid;

fn four_digits() -> u32 {
    (Uuid::new_v4().as_u128() % 10_000) as u32
}

/// `CMD-YYYYMMDD-NNNN`. The suffix is random, collisions are possible and
/// not checked.
pub fn order_reference(now: DateTime<Utc>) -> String {
    format!("CMD-{}-{:04}", now.format("%Y%m%d"), four_digits())
}

/// `CL-NNNN` internal client code.
pub fn client_code() -> String {
    format!("CL-{:04}", four_digits())
}

/// `FAC-YYYYMM-<first 8 chars of the client id>`: one invoice per client and
/// month.
pub fn invoice_reference(year: i32, month: u32, client_id: Uuid) -> String {
    let client = client_id.simple().to_string();
    format!("FAC-{year}{month:02}-{}", &client[..8])
}
