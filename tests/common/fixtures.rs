//! RFC examples and canned test data.

/// Examples from RFC 7643 and RFC 7644
pub mod rfc_examples {
    use scim_silo::schema::embedded::{GROUP_SCHEMA, USER_SCHEMA};
    use serde_json::{Value, json};

    /// RFC 7643 Section 8.1 minimal user, without the server-assigned parts
    pub fn user_minimal() -> Value {
        json!({
            "schemas": [USER_SCHEMA],
            "userName": "bjensen@example.com"
        })
    }

    /// RFC 7643 Section 8.4 group, without members
    pub fn group_tour_guides() -> Value {
        json!({
            "schemas": [GROUP_SCHEMA],
            "displayName": "Tour Guides"
        })
    }

    /// RFC 7644 Section 3.5.2.1 member addition
    pub fn add_member_operation(member_id: &str) -> Value {
        json!([{
            "op": "add",
            "path": "members",
            "value": [{"value": member_id}]
        }])
    }

    /// RFC 7644 Section 3.5.2.2 member removal with a value filter
    pub fn remove_member_operation(member_id: &str) -> Value {
        json!([{
            "op": "remove",
            "path": format!("members[value eq \"{}\"]", member_id)
        }])
    }
}

/// Device data used across the search and patch tests
pub mod test_fixtures {
    use crate::common::builders::DeviceBuilder;
    use serde_json::Value;

    /// A fully populated device
    pub fn device_full(serial_number: &str) -> Value {
        DeviceBuilder::new(serial_number)
            .with_manufacturer("keydap")
            .with_rating(1)
            .with_price(7.2)
            .with_mac_id("6A:5F:0C:11:22:33")
            .with_location("1.1", "2.2")
            .with_photo("abc.jpg", true)
            .with_photo("xyz.jpg", false)
            .with_attribute("installedDate", "2016-05-17T14:19:14Z".into())
            .build()
    }

    /// Ten devices with manufacturers `maker0`..`maker4` and ratings 0..9
    pub fn device_fleet() -> Vec<Value> {
        (0..10)
            .map(|i| {
                DeviceBuilder::new(&format!("SN-{:03}", i))
                    .with_manufacturer(&format!("maker{}", i % 5))
                    .with_rating(i)
                    .with_price(i as f64 * 10.0)
                    .build()
            })
            .collect()
    }
}
