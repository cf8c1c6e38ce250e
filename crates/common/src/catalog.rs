//! Static catalogs: which widgets exist and which fields each integration form needs.

use crate::types::IntegrationKind;
use serde::Serialize;

/// A tile type the dashboard can render.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetType {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub integration: IntegrationKind,
    pub default_w: u32,
    pub default_h: u32,
    pub refresh_interval_secs: u64,
}

pub const WIDGET_TYPES: &[WidgetType] = &[
    WidgetType {
        id: "proxmox",
        name: "Proxmox",
        description: "Node load and guest status",
        integration: IntegrationKind::Proxmox,
        default_w: 6,
        default_h: 4,
        refresh_interval_secs: 30,
    },
    WidgetType {
        id: "adguard",
        name: "AdGuard Home",
        description: "DNS & ad-blocking stats",
        integration: IntegrationKind::AdGuard,
        default_w: 4,
        default_h: 4,
        refresh_interval_secs: 30,
    },
    WidgetType {
        id: "nginx-proxy-manager",
        name: "Nginx Proxy Manager",
        description: "Proxy hosts and certificates",
        integration: IntegrationKind::NginxProxyManager,
        default_w: 4,
        default_h: 4,
        refresh_interval_secs: 60,
    },
];

pub fn widget_type(id: &str) -> Option<&'static WidgetType> {
    WIDGET_TYPES.iter().find(|w| w.id == id)
}

/// Input type of an integration form field
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Password,
    Checkbox,
}

#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub placeholder: &'static str,
    pub required: bool,
}

/// Description of an integration type for the "add integration" screen.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrationType {
    pub id: IntegrationKind,
    pub name: &'static str,
    pub description: &'static str,
    pub default_port: u16,
    pub fields: Vec<FormField>,
}

const fn field(
    name: &'static str,
    label: &'static str,
    field_type: FieldType,
    placeholder: &'static str,
    required: bool,
) -> FormField {
    FormField {
        name,
        label,
        field_type,
        placeholder,
        required,
    }
}

pub fn integration_type(kind: IntegrationKind) -> IntegrationType {
    let mut fields = vec![
        field("name", "Name", FieldType::Text, "e.g. My server", true),
        field("host", "Host", FieldType::Text, "192.168.1.100", true),
    ];
    let (description, extra) = match kind {
        IntegrationKind::Proxmox => (
            "Proxmox Virtual Environment",
            vec![
                field("port", "Port", FieldType::Text, "8006", true),
                field("tokenId", "Token ID", FieldType::Text, "user@pam!tokenname", true),
                field(
                    "tokenSecret",
                    "Token Secret",
                    FieldType::Password,
                    "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
                    true,
                ),
            ],
        ),
        IntegrationKind::AdGuard => (
            "AdGuard Home DNS server",
            vec![
                field("port", "Port", FieldType::Text, "80", true),
                field("username", "Username", FieldType::Text, "admin", true),
                field("password", "Password", FieldType::Password, "", true),
                field("https", "Use HTTPS", FieldType::Checkbox, "", false),
            ],
        ),
        IntegrationKind::NginxProxyManager => (
            "Nginx Proxy Manager",
            vec![
                field("port", "Port", FieldType::Text, "81", true),
                field("email", "E-mail", FieldType::Text, "admin@example.com", true),
                field("password", "Password", FieldType::Password, "", true),
                field("https", "Use HTTPS", FieldType::Checkbox, "", false),
            ],
        ),
    };
    fields.extend(extra);

    IntegrationType {
        id: kind,
        name: kind.display_name(),
        description,
        default_port: kind.default_port(),
        fields,
    }
}

pub fn integration_types() -> Vec<IntegrationType> {
    IntegrationKind::ALL.iter().copied().map(integration_type).collect()
}
