//! Platform template registry and markup resolution
//!
//! Each supported messaging platform is a data entry: a palette, canvas
//! metrics, and per-message budgets plugged into one shared markup skeleton.
//! Adding a platform means registering a new entry, never a new code path.
//!
//! Resolution is a pure function: identical `(platform, window, scene,
//! image)` inputs always produce byte-identical markup, which is what the
//! golden tests key on.

use std::collections::HashMap;

use base64::Engine as Base64Engine;

use crate::conversation::{MessageWindow, Sender};
use crate::error::{Error, Result};
use crate::image::EvidenceImage;
use crate::Canvas;

/// Color palette and chrome strings for one platform
#[derive(Debug, Clone)]
pub struct PlatformStyle {
    pub bg_color: &'static str,
    pub header_bg: &'static str,
    pub header_text_color: &'static str,
    pub border_color: &'static str,
    pub sent_bg: &'static str,
    pub sent_text_color: &'static str,
    pub received_bg: &'static str,
    pub received_text_color: &'static str,
    pub input_placeholder: &'static str,
    pub status: &'static str,
    /// Whether sent bubbles carry a delivery-tick timestamp
    pub delivery_ticks: bool,
}

/// A registered platform: identifier, layout metrics, and palette
#[derive(Debug, Clone)]
pub struct PlatformTemplate {
    pub id: &'static str,
    pub canvas: Canvas,
    /// Per-message character budget before truncation kicks in
    pub max_chars: usize,
    /// Most bubbles (messages + image) that fit the canvas without overflow.
    /// Calibrated empirically against the 375x812 skeleton, not derived.
    pub max_bubbles: usize,
    pub style: PlatformStyle,
}

/// Everything about a render that is not the transcript or the image:
/// contact identity, status-bar clock, and which side posts the image.
///
/// Scenes are derived deterministically from the job index by the batch
/// expander so that resolution stays reproducible.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub contact_name: String,
    pub clock: String,
    pub image_sender: Sender,
}

/// Closed registry of platform templates, loaded once at startup
pub struct TemplateRegistry {
    templates: HashMap<&'static str, PlatformTemplate>,
}

impl TemplateRegistry {
    /// Registry with the four built-in platforms
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        for template in builtin_templates() {
            templates.insert(template.id, template);
        }
        Self { templates }
    }

    /// Empty registry (tests register their own entries)
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    pub fn register(&mut self, template: PlatformTemplate) {
        self.templates.insert(template.id, template);
    }

    /// Look up a platform entry
    pub fn get(&self, platform_id: &str) -> Result<&PlatformTemplate> {
        self.templates
            .get(platform_id)
            .ok_or_else(|| Error::UnknownPlatform(platform_id.to_string()))
    }

    pub fn platform_ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.templates.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Resolve a window, scene, and image into self-contained page markup.
    ///
    /// All transcript text is HTML-escaped before substitution, and the
    /// image is embedded as a base64 data URI so the renderer never has to
    /// fetch anything over the network.
    pub fn resolve(
        &self,
        platform_id: &str,
        window: &MessageWindow,
        scene: &Scene,
        image: &EvidenceImage,
    ) -> Result<String> {
        let template = self.get(platform_id)?;
        let style = &template.style;

        let mut bubbles = String::new();
        for (i, msg) in window.messages.iter().enumerate() {
            push_message_bubble(&mut bubbles, template, &msg.text, msg.sender, i);
            if i == window.image_after {
                push_image_bubble(&mut bubbles, scene.image_sender, image);
            }
        }

        let initials = contact_initials(&scene.contact_name);

        let markup = PHONE_SKELETON
            .replace("{{BG_COLOR}}", style.bg_color)
            .replace("{{HEADER_BG}}", style.header_bg)
            .replace("{{HEADER_TEXT_COLOR}}", style.header_text_color)
            .replace("{{BORDER_COLOR}}", style.border_color)
            .replace("{{SENT_BG}}", style.sent_bg)
            .replace("{{SENT_TEXT_COLOR}}", style.sent_text_color)
            .replace("{{RECEIVED_BG}}", style.received_bg)
            .replace("{{RECEIVED_TEXT_COLOR}}", style.received_text_color)
            .replace("{{CANVAS_WIDTH}}", &template.canvas.width.to_string())
            .replace("{{CANVAS_HEIGHT}}", &template.canvas.height.to_string())
            .replace("{{CLOCK}}", &escape_html(&scene.clock))
            .replace("{{CONTACT_NAME}}", &escape_html(&scene.contact_name))
            .replace("{{CONTACT_INITIALS}}", &escape_html(&initials))
            .replace("{{CONTACT_STATUS}}", style.status)
            .replace("{{INPUT_PLACEHOLDER}}", style.input_placeholder)
            .replace("{{MESSAGES}}", &bubbles);

        Ok(markup)
    }
}

fn push_message_bubble(
    out: &mut String,
    template: &PlatformTemplate,
    text: &str,
    sender: Sender,
    index: usize,
) {
    out.push_str(&format!(
        "<div class=\"message {}\"><div class=\"message-bubble\">{}",
        sender.css_class(),
        escape_html(text)
    ));
    if template.style.delivery_ticks && sender == Sender::Sent {
        out.push_str(&format!(
            "<div class=\"message-time\">{} &#10003;&#10003;</div>",
            tick_time(index)
        ));
    }
    out.push_str("</div></div>");
}

fn push_image_bubble(out: &mut String, sender: Sender, image: &EvidenceImage) {
    let b64 = base64::engine::general_purpose::STANDARD.encode(image.bytes());
    out.push_str(&format!(
        "<div class=\"message {}\"><div class=\"message-bubble\">\
         <img src=\"data:{};base64,{}\" alt=\"attachment\"></div></div>",
        sender.css_class(),
        image.mime(),
        b64
    ));
}

/// Deterministic per-bubble timestamp for delivery ticks.
/// A plausible clock reading derived only from the bubble index.
fn tick_time(index: usize) -> String {
    let hour = 1 + (index * 5 + 9) % 12;
    let minute = (index * 17 + 23) % 60;
    format!("{}:{:02}", hour, minute)
}

/// Up to two initial letters for the avatar block
fn contact_initials(name: &str) -> String {
    name.split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .collect()
}

/// Escape text for substitution into markup
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn builtin_templates() -> Vec<PlatformTemplate> {
    let canvas = Canvas {
        width: 375,
        height: 812,
    };
    vec![
        PlatformTemplate {
            id: "imessage",
            canvas,
            max_chars: 150,
            max_bubbles: 9,
            style: PlatformStyle {
                bg_color: "#FFFFFF",
                header_bg: "#F2F2F7",
                header_text_color: "#000000",
                border_color: "#C6C6C8",
                sent_bg: "#007AFF",
                sent_text_color: "#FFFFFF",
                received_bg: "#E8E8ED",
                received_text_color: "#000000",
                input_placeholder: "iMessage",
                status: "",
                delivery_ticks: false,
            },
        },
        PlatformTemplate {
            id: "whatsapp",
            canvas,
            max_chars: 150,
            max_bubbles: 9,
            style: PlatformStyle {
                bg_color: "#EFEAE2",
                header_bg: "#008069",
                header_text_color: "#FFFFFF",
                border_color: "#008069",
                sent_bg: "#D9FDD3",
                sent_text_color: "#000000",
                received_bg: "#FFFFFF",
                received_text_color: "#000000",
                input_placeholder: "Message",
                status: "online",
                delivery_ticks: true,
            },
        },
        PlatformTemplate {
            id: "messenger",
            canvas,
            max_chars: 150,
            max_bubbles: 9,
            style: PlatformStyle {
                bg_color: "#FFFFFF",
                header_bg: "#FFFFFF",
                header_text_color: "#000000",
                border_color: "#E4E6EB",
                sent_bg: "linear-gradient(135deg, #0099FF 0%, #0084FF 100%)",
                sent_text_color: "#FFFFFF",
                received_bg: "#E4E6EB",
                received_text_color: "#050505",
                input_placeholder: "Aa",
                status: "",
                delivery_ticks: false,
            },
        },
        PlatformTemplate {
            id: "signal",
            canvas,
            max_chars: 150,
            max_bubbles: 9,
            style: PlatformStyle {
                bg_color: "#FFFFFF",
                header_bg: "#F2F2F7",
                header_text_color: "#000000",
                border_color: "#D1D1D6",
                sent_bg: "#5E5CE6",
                sent_text_color: "#FFFFFF",
                received_bg: "#E5E5EA",
                received_text_color: "#000000",
                input_placeholder: "Signal message",
                status: "",
                delivery_ticks: false,
            },
        },
    ]
}

/// Shared markup skeleton, styled per platform through the palette slots.
/// Layout mirrors a 375x812 phone screen: notch, status bar, chat header,
/// scrollable message list, input bar, home indicator.
const PHONE_SKELETON: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        * { margin: 0; padding: 0; box-sizing: border-box; }
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'SF Pro Text', 'Helvetica Neue', sans-serif;
            -webkit-font-smoothing: antialiased;
        }
        .phone-screen {
            width: {{CANVAS_WIDTH}}px;
            height: {{CANVAS_HEIGHT}}px;
            background: {{BG_COLOR}};
            position: relative;
            display: flex;
            flex-direction: column;
        }
        .notch {
            width: 165px; height: 30px; background: #000;
            position: absolute; top: 0; left: 50%;
            transform: translateX(-50%); border-radius: 0 0 20px 20px;
            z-index: 10;
        }
        .status-bar {
            height: 47px; background: {{HEADER_BG}};
            display: flex; justify-content: space-between; align-items: flex-end;
            padding: 0 20px 8px 20px; font-size: 15px; font-weight: 500;
            color: {{HEADER_TEXT_COLOR}};
            flex-shrink: 0;
        }
        .chat-header {
            height: 56px; background: {{HEADER_BG}};
            display: flex; align-items: center; padding: 0 8px 0 4px;
            border-bottom: 0.5px solid {{BORDER_COLOR}};
            color: {{HEADER_TEXT_COLOR}};
            flex-shrink: 0;
        }
        .back-button { font-size: 28px; padding: 8px; line-height: 1; }
        .avatar {
            width: 36px; height: 36px; border-radius: 50%;
            background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
            margin: 0 8px; overflow: hidden;
            display: flex; align-items: center; justify-content: center;
            color: #fff; font-size: 14px; font-weight: 600;
        }
        .contact-info { flex: 1; }
        .contact-name { font-size: 17px; font-weight: 600; }
        .contact-status { font-size: 12px; opacity: 0.8; }
        .messages-container {
            padding: 16px;
            background: {{BG_COLOR}};
            flex: 1;
            overflow-y: auto;
            display: flex;
            flex-direction: column;
        }
        .message {
            display: flex; margin-bottom: 4px; gap: 8px; align-items: flex-end;
        }
        .message.sent { justify-content: flex-end; }
        .message.received { justify-content: flex-start; }
        .message-bubble {
            max-width: 70%; padding: 8px 12px; border-radius: 18px;
            font-size: 16px; line-height: 1.4; word-wrap: break-word;
        }
        .sent .message-bubble {
            background: {{SENT_BG}}; color: {{SENT_TEXT_COLOR}};
            border-bottom-right-radius: 4px;
        }
        .received .message-bubble {
            background: {{RECEIVED_BG}}; color: {{RECEIVED_TEXT_COLOR}};
            border-bottom-left-radius: 4px;
        }
        .message-bubble img {
            max-width: 100%; max-height: 200px; border-radius: 8px;
            display: block; margin: 4px 0; object-fit: contain;
        }
        .message-time {
            font-size: 11px; opacity: 0.6; margin-top: 2px;
            display: flex; align-items: center; justify-content: flex-end; gap: 3px;
        }
        .input-bar {
            height: 50px; border-top: 0.5px solid {{BORDER_COLOR}};
            background: {{HEADER_BG}}; display: flex; align-items: center;
            padding: 6px 8px; gap: 8px;
            flex-shrink: 0;
        }
        .text-input {
            flex: 1; height: 36px; background: white; border: 1px solid #D1D1D6;
            border-radius: 18px; padding: 0 14px; font-size: 16px; color: #8E8E93;
            display: flex; align-items: center;
        }
        .home-indicator {
            height: 34px; display: flex; align-items: center;
            justify-content: center; background: {{HEADER_BG}};
            flex-shrink: 0;
        }
        .home-indicator-bar {
            width: 140px; height: 5px; background: #000;
            border-radius: 3px; opacity: 0.3;
        }
    </style>
</head>
<body>
    <div class="phone-screen">
        <div class="notch"></div>
        <div class="status-bar">
            <span>{{CLOCK}}</span>
            <span>78%</span>
        </div>
        <div class="chat-header">
            <div class="back-button">&#8249;</div>
            <div class="avatar">{{CONTACT_INITIALS}}</div>
            <div class="contact-info">
                <div class="contact-name">{{CONTACT_NAME}}</div>
                <div class="contact-status">{{CONTACT_STATUS}}</div>
            </div>
        </div>
        <div class="messages-container">{{MESSAGES}}</div>
        <div class="input-bar">
            <div class="text-input">{{INPUT_PLACEHOLDER}}</div>
        </div>
        <div class="home-indicator">
            <div class="home-indicator-bar"></div>
        </div>
    </div>
</body>
</html>
"#;
