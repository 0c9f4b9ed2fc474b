/*!
Pulsenode DevKit - development stubs

Lets agent code and tests run without a live broker:
- Mock MQTT client recording publishes and subscriptions
- Builders for the fleet's JSON payloads
*/

pub mod mqtt_stub;
pub mod payloads;

pub use mqtt_stub::MockMqttClient;
