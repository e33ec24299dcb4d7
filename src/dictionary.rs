//! Dictionary: the process-wide map from AVP/command codes to their types
//! and ABNF rules. Loaded once at startup (bundled base protocol plus
//! whatever an embedder merges in) and shared behind an `Arc` from then on.

use crate::avp::AvpType;
use crate::error::{Error, Result};
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_xml_rs::from_str;
use std::collections::BTreeMap;
use std::sync::RwLock;

#[derive(Debug, Clone)]
pub struct AvpEntry {
    pub code: u32,
    pub vendor_id: Option<u32>,
    pub name: String,
    pub avp_type: AvpType,
}

/// Where a rule's target AVP must sit among a command's/grouped-AVP's
/// children (spec.md §3 "Rule" / §4.2 "Fixed-head rules must appear in
/// declared order at the front").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePosition {
    /// Must appear, in declared order, as the leading children.
    Fixed,
    Required,
    Optional,
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub avp_name: String,
    pub avp_code: u32,
    pub required: bool,
    pub max: Option<usize>,
    pub min: Option<usize>,
    pub position: RulePosition,
}

#[derive(Debug, Clone, Default)]
pub struct CommandRules {
    rules: Vec<Rule>,
}

impl CommandRules {
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

#[derive(Debug, Clone)]
struct CommandDef {
    name: String,
    request_rules: Vec<Rule>,
    answer_rules: Vec<Rule>,
}

/// A `code`/`(code, vendor_id)`-keyed store of AVP and command definitions,
/// safe to share across peer tasks via `Arc<Dictionary>`. Lookups are
/// synchronous (the codec runs on plain `std::io::Read`/`Write`), so this
/// uses `std::sync::RwLock` rather than `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct Dictionary {
    avps: RwLock<BTreeMap<(u32, Option<u32>), AvpEntry>>,
    avp_names: RwLock<BTreeMap<String, (u32, Option<u32>)>>,
    commands: RwLock<BTreeMap<u32, CommandDef>>,
    vendors: RwLock<BTreeMap<u32, String>>,
}

impl Dictionary {
    pub fn empty() -> Dictionary {
        Dictionary::default()
    }

    /// Merges one or more XML dictionary sources, in order, into a fresh
    /// `Dictionary`. A later source's AVP/command definitions overwrite an
    /// earlier source's for the same key, so embedders can layer
    /// vendor-specific dictionaries on top of the bundled base.
    pub fn new(xml_sources: &[&str]) -> Dictionary {
        let dict = Dictionary::empty();
        for xml in xml_sources {
            if let Err(e) = dict.load_xml(xml) {
                log::warn!("failed to load dictionary source: {}", e);
            }
        }
        dict
    }

    pub fn new_default() -> Dictionary {
        Dictionary::new(&[&DEFAULT_DICT_XML])
    }

    pub fn load_xml(&self, xml: &str) -> Result<()> {
        let parsed: XmlDiameter =
            from_str(xml).map_err(|e| Error::DictionaryError(e.to_string()))?;
        self.load_application(parsed.application);
        Ok(())
    }

    pub fn load_json(&self, json: &str) -> Result<()> {
        let schema: json::Schema =
            serde_json::from_str(json).map_err(|e| Error::DictionaryError(e.to_string()))?;
        for vendor in schema.vendors {
            self.add_vendor(vendor.id, vendor.name);
        }
        for avp in schema.avps {
            self.add_avp(
                avp.code,
                avp.vendor_id,
                avp.name,
                parse_avp_type(&avp.avp_type),
            );
        }
        for command in schema.commands {
            let request_rules = command.request.rules.into_iter().map(json_rule).collect();
            let answer_rules = command.answer.rules.into_iter().map(json_rule).collect();
            self.add_command(command.code, command.name, request_rules, answer_rules);
        }
        Ok(())
    }

    fn load_application(&self, app: XmlApplication) {
        for vendor in &app.vendor {
            if let Ok(id) = vendor.id.parse::<u32>() {
                self.add_vendor(id, vendor.name.clone());
            }
        }

        for avp in &app.avps {
            let code = match avp.code.parse::<u32>() {
                Ok(c) => c,
                Err(_) => continue,
            };
            let vendor_id = avp.vendor_id.as_ref().and_then(|v| v.parse::<u32>().ok());
            let avp_type = parse_avp_type(&avp.data.data_type);
            self.add_avp(code, vendor_id, avp.name.clone(), avp_type);
        }

        if let Some(command) = app.command {
            let code = match command.code.parse::<u32>() {
                Ok(c) => c,
                Err(_) => return,
            };
            let request_rules = command
                .request
                .rules
                .iter()
                .map(|r| self.resolve_rule(r))
                .collect();
            let answer_rules = command
                .answer
                .rules
                .iter()
                .map(|r| self.resolve_rule(r))
                .collect();
            self.add_command(code, command.name.clone(), request_rules, answer_rules);
        }
    }

    fn resolve_rule(&self, rule: &XmlRule) -> Rule {
        let code = self
            .avp_names
            .read()
            .unwrap()
            .get(&rule.avp)
            .map(|(c, _)| *c)
            .unwrap_or(0);
        let required = rule.required == "true";
        let position = if rule.first.as_deref() == Some("true") {
            RulePosition::Fixed
        } else if required {
            RulePosition::Required
        } else {
            RulePosition::Optional
        };
        Rule {
            avp_name: rule.avp.clone(),
            avp_code: code,
            required,
            max: rule.max.as_ref().and_then(|m| m.parse().ok()),
            min: rule.min.as_ref().and_then(|m| m.parse().ok()),
            position,
        }
    }

    pub fn add_vendor(&self, id: u32, name: impl Into<String>) {
        self.vendors.write().unwrap().insert(id, name.into());
    }

    pub fn add_avp(&self, code: u32, vendor_id: Option<u32>, name: String, avp_type: AvpType) {
        self.avp_names
            .write()
            .unwrap()
            .insert(name.clone(), (code, vendor_id));
        self.avps.write().unwrap().insert(
            (code, vendor_id),
            AvpEntry {
                code,
                vendor_id,
                name,
                avp_type,
            },
        );
    }

    pub fn add_command(
        &self,
        code: u32,
        name: String,
        request_rules: Vec<Rule>,
        answer_rules: Vec<Rule>,
    ) {
        self.commands.write().unwrap().insert(
            code,
            CommandDef {
                name,
                request_rules,
                answer_rules,
            },
        );
    }

    /// Looks up by `(code, vendor)` first, falling back to `(code, None)`
    /// since most dictionaries key Understood-but-vendorless lookups that way.
    pub fn get_avp_type(&self, code: u32, vendor_id: Option<u32>) -> Option<AvpType> {
        let avps = self.avps.read().unwrap();
        avps.get(&(code, vendor_id))
            .or_else(|| avps.get(&(code, None)))
            .map(|e| e.avp_type)
    }

    pub fn get_avp_name(&self, code: u32, vendor_id: Option<u32>) -> Option<String> {
        let avps = self.avps.read().unwrap();
        avps.get(&(code, vendor_id))
            .or_else(|| avps.get(&(code, None)))
            .map(|e| e.name.clone())
    }

    pub fn get_avp_code(&self, name: &str) -> Option<(u32, Option<u32>)> {
        self.avp_names.read().unwrap().get(name).copied()
    }

    pub fn get_command(&self, code: u32, request: bool) -> Option<CommandRules> {
        let commands = self.commands.read().unwrap();
        commands.get(&code).map(|c| CommandRules {
            rules: if request {
                c.request_rules.clone()
            } else {
                c.answer_rules.clone()
            },
        })
    }

    pub fn get_vendor_name(&self, id: u32) -> Option<String> {
        self.vendors.read().unwrap().get(&id).cloned()
    }
}

fn parse_avp_type(data_type: &str) -> AvpType {
    match data_type {
        "UTF8String" => AvpType::UTF8String,
        "OctetString" => AvpType::OctetString,
        "Integer32" => AvpType::Integer32,
        "Integer64" => AvpType::Integer64,
        "Unsigned32" => AvpType::Unsigned32,
        "Unsigned64" => AvpType::Unsigned64,
        "Enumerated" => AvpType::Enumerated,
        "Grouped" => AvpType::Grouped,
        "DiameterIdentity" => AvpType::Identity,
        "DiameterURI" => AvpType::DiameterURI,
        "Time" => AvpType::Time,
        "Address" | "IPv4" | "IPv6" => AvpType::Address,
        "Float32" => AvpType::Float32,
        "Float64" => AvpType::Float64,
        _ => AvpType::Unknown,
    }
}

fn json_rule(r: json::Rule) -> Rule {
    let position = if r.first {
        RulePosition::Fixed
    } else if r.required {
        RulePosition::Required
    } else {
        RulePosition::Optional
    };
    Rule {
        avp_name: r.avp,
        avp_code: r.avp_code,
        required: r.required,
        max: r.max,
        min: r.min,
        position,
    }
}

/// JSON dictionary schema, supplementing the bundled XML base dictionary
/// per the external interface's JSON requirement.
pub mod json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct Schema {
        #[serde(default)]
        pub vendors: Vec<Vendor>,
        #[serde(default)]
        pub avps: Vec<Avp>,
        #[serde(default)]
        pub commands: Vec<Command>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Vendor {
        pub id: u32,
        pub name: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Avp {
        pub code: u32,
        pub vendor_id: Option<u32>,
        pub name: String,
        #[serde(rename = "type")]
        pub avp_type: String,
    }

    #[derive(Debug, Deserialize)]
    pub struct Command {
        pub code: u32,
        pub name: String,
        pub request: RuleSet,
        pub answer: RuleSet,
    }

    #[derive(Debug, Deserialize, Default)]
    pub struct RuleSet {
        #[serde(default)]
        pub rules: Vec<Rule>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Rule {
        pub avp: String,
        pub avp_code: u32,
        pub required: bool,
        pub max: Option<usize>,
        pub min: Option<usize>,
        /// spec.md §6: "optional `First` boolean" — a fixed-head rule.
        #[serde(default)]
        pub first: bool,
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlDiameter {
    application: XmlApplication,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlApplication {
    #[allow(dead_code)]
    id: String,
    #[allow(dead_code)]
    name: String,
    command: Option<XmlCommand>,
    #[serde(rename = "vendor", default)]
    vendor: Vec<XmlVendor>,
    #[serde(rename = "avp", default)]
    avps: Vec<XmlAvp>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlVendor {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlCommand {
    code: String,
    #[allow(dead_code)]
    short: String,
    name: String,
    request: XmlCommandDetail,
    answer: XmlCommandDetail,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlCommandDetail {
    #[serde(rename = "rule", default)]
    rules: Vec<XmlRule>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlRule {
    avp: String,
    required: String,
    max: Option<String>,
    min: Option<String>,
    /// Fixed-head position (spec.md §3 "Rule.position"); absent means not
    /// fixed.
    #[serde(default)]
    first: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlAvp {
    name: String,
    code: String,
    #[serde(rename = "vendor-id")]
    vendor_id: Option<String>,
    #[allow(dead_code)]
    must: Option<String>,
    #[allow(dead_code)]
    may: Option<String>,
    #[serde(rename = "must-not")]
    #[allow(dead_code)]
    must_not: Option<String>,
    #[serde(rename = "may-encrypt")]
    #[allow(dead_code)]
    may_encrypt: Option<String>,
    data: XmlData,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlData {
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    #[allow(dead_code)]
    item: Vec<XmlItem>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlItem {
    #[allow(dead_code)]
    code: String,
    #[allow(dead_code)]
    name: String,
}

lazy_static! {
    pub static ref DEFAULT_DICT: Dictionary = Dictionary::new_default();
    pub static ref DEFAULT_DICT_XML: &'static str = {
        let xml = r#"
<diameter>
    <application id="0" name="Base">
        <avp name="Session-Id" code="263" must="M" may="P" must-not="V" may-encrypt="Y">
            <data type="UTF8String"/>
        </avp>

        <avp name="Origin-Host" code="264" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="DiameterIdentity"/>
        </avp>

        <avp name="CC-Request-Number" code="415" must="M" may="P" must-not="V" may-encrypt="Y">
            <!-- http://tools.ietf.org/html/rfc4006#section-8.2 -->
            <data type="Unsigned32"/>
        </avp>

        <avp name="Origin-Realm" code="296" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="DiameterIdentity"/>
        </avp>

        <avp name="Destination-Host" code="293" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="DiameterIdentity"/>
        </avp>

        <avp name="Destination-Realm" code="283" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="DiameterIdentity"/>
        </avp>

        <avp name="Auth-Application-Id" code="258" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Unsigned32"/>
        </avp>

        <avp name="Acct-Application-Id" code="259" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Unsigned32"/>
        </avp>

        <avp name="Vendor-Specific-Application-Id" code="260" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Grouped">
                <rule avp="Vendor-Id" required="true" max="1"/>
                <rule avp="Auth-Application-Id" required="false" max="1"/>
                <rule avp="Acct-Application-Id" required="false" max="1"/>
            </data>
        </avp>

        <avp name="Vendor-Id" code="266" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Unsigned32"/>
        </avp>

        <avp name="Product-Name" code="269" must="-" may="P" must-not="V,M" may-encrypt="-">
            <data type="UTF8String"/>
        </avp>

        <avp name="Host-IP-Address" code="257" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Address"/>
        </avp>

        <avp name="Firmware-Revision" code="267" must="-" may="-" must-not="V,M,P" may-encrypt="-">
            <data type="Unsigned32"/>
        </avp>

        <avp name="Origin-State-Id" code="278" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Unsigned32"/>
        </avp>

        <avp name="Error-Message" code="281" must="-" may="P" must-not="V,M" may-encrypt="-">
            <data type="UTF8String"/>
        </avp>

        <avp name="Disconnect-Cause" code="273" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Enumerated">
                <item code="0" name="REBOOTING"/>
                <item code="1" name="BUSY"/>
                <item code="2" name="DO_NOT_WANT_TO_TALK_TO_YOU"/>
            </data>
        </avp>

        <avp name="Result-Code" code="268" must="M" may="P" must-not="V" may-encrypt="-">
            <data type="Unsigned32"/>
        </avp>

        <avp name="Service-Information" code="873" must="V,M" may="P" must-not="-" may-encrypt="N" vendor-id="10415">
            <data type="Grouped">
                <rule avp="Subscription-Id" required="false"/>
                <rule avp="PS-Information" required="false" max="1"/>
            </data>
        </avp>

        <avp name="PS-Information" code="874" must="V,M" may="P" must-not="-" may-encrypt="N" vendor-id="10415">
            <data type="Grouped">
                <rule avp="Called-Station-Id" required="false" max="1"/>
            </data>
        </avp>

        <avp name="Subscription-Id" code="443" must="M" may="P" must-not="V" may-encrypt="Y">
            <data type="Grouped">
                <rule avp="Subscription-Id-Type" required="true" max="1"/>
                <rule avp="Subscription-Id-Data" required="true" max="1"/>
            </data>
        </avp>

        <avp name="Subscription-Id-Type" code="450" must="M" may="P" must-not="V" may-encrypt="Y">
            <data type="Enumerated">
                <item code="0" name="END_USER_E164"/>
                <item code="1" name="END_USER_IMSI"/>
            </data>
        </avp>

        <avp name="Subscription-Id-Data" code="444" must="M" may="P" must-not="V" may-encrypt="Y">
            <data type="UTF8String"/>
        </avp>

        <avp name="Called-Station-Id" code="30" must="M" may="-" must-not="V" may-encrypt="Y">
            <data type="UTF8String"/>
        </avp>

        <avp name="CC-Request-Type" code="416" must="M" may="P" must-not="V" may-encrypt="Y">
            <!-- http://tools.ietf.org/html/rfc4006#section-8.3 -->
            <data type="Enumerated">
                <item code="1" name="INITIAL_REQUEST"/>
                <item code="2" name="UPDATE_REQUEST"/>
                <item code="3" name="TERMINATION_REQUEST"/>
            </data>
        </avp>

        <avp name="Timezone-Offset" code="571" vendor-id="10415" must="V" may-encrypt="Y">
            <data type="Integer32"/>
        </avp>

        <command code="272" short="CC" name="Credit-Control">
            <request>
                <rule avp="Session-Id" required="true" max="1"/>
                <rule avp="Origin-Host" required="true" max="1"/>
                <rule avp="Origin-Realm" required="true" max="1"/>
                <rule avp="Destination-Realm" required="true" max="1"/>
                <rule avp="CC-Request-Type" required="true" max="1"/>
                <rule avp="CC-Request-Number" required="true" max="1"/>
            </request>
            <answer>
                <rule avp="Session-Id" required="true" max="1"/>
                <rule avp="Result-Code" required="true" max="1"/>
                <rule avp="Origin-Host" required="true" max="1"/>
                <rule avp="Origin-Realm" required="true" max="1"/>
            </answer>
        </command>
    </application>
</diameter>
    "#;
        xml
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_code() {
        let dict = Dictionary::new_default();
        assert_eq!(dict.get_avp_type(264, None), Some(AvpType::Identity));
        assert_eq!(dict.get_avp_name(264, None), Some("Origin-Host".to_string()));
        assert_eq!(dict.get_avp_type(9999999, None), None);
    }

    #[test]
    fn test_lookup_by_name() {
        let dict = Dictionary::new_default();
        assert_eq!(dict.get_avp_code("Result-Code"), Some((268, None)));
    }

    #[test]
    fn test_command_rules() {
        let dict = Dictionary::new_default();
        let request = dict.get_command(272, true).unwrap();
        assert!(request.rules().iter().any(|r| r.avp_code == 263));

        let answer = dict.get_command(272, false).unwrap();
        assert!(answer.rules().iter().any(|r| r.avp_code == 268));
    }

    #[test]
    fn test_merge_multiple_sources() {
        let extra = r#"
<diameter>
    <application id="16777238" name="Gx">
        <avp name="Charging-Rule-Name" code="1005" vendor-id="10415" must="V,M" may="P" must-not="-" may-encrypt="Y">
            <data type="OctetString"/>
        </avp>
    </application>
</diameter>
        "#;
        let dict = Dictionary::new(&[&DEFAULT_DICT_XML, extra]);
        assert_eq!(dict.get_avp_type(264, None), Some(AvpType::Identity));
        assert_eq!(
            dict.get_avp_type(1005, Some(10415)),
            Some(AvpType::OctetString)
        );
    }

    #[test]
    fn test_load_json() {
        let dict = Dictionary::empty();
        let json = r#"
        {
            "vendors": [{"id": 10415, "name": "3GPP"}],
            "avps": [{"code": 1, "vendor_id": null, "name": "User-Name", "type": "UTF8String"}],
            "commands": []
        }
        "#;
        dict.load_json(json).unwrap();
        assert_eq!(dict.get_avp_type(1, None), Some(AvpType::UTF8String));
        assert_eq!(dict.get_vendor_name(10415), Some("3GPP".to_string()));
    }
}
