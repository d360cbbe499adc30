//! Expression style catalog.
//!
//! Twelve fixed styles: three free, nine unlocked by payment. Prompts use
//! the training trigger token so the personalized model renders the
//! submitter's face.

use crate::job::Tier;

/// Token the personalized model is trained to associate with the subject.
pub const TRIGGER_TOKEN: &str = "TOK";

/// A named target look rendered by the inference provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleDescriptor {
    pub id: &'static str,
    pub label: &'static str,
    pub emoji: &'static str,
    pub tier: Tier,
    pub prompt: &'static str,
}

macro_rules! style {
    ($id:literal, $label:literal, $emoji:literal, $tier:ident, $prompt:literal) => {
        StyleDescriptor {
            id: $id,
            label: $label,
            emoji: $emoji,
            tier: Tier::$tier,
            prompt: concat!(
                "TOK person, ",
                $prompt,
                ", full head visible, head and shoulders portrait, soft studio lighting, \
                 neutral background, even illumination, high quality, youtube thumbnail style, 8k"
            ),
        }
    };
}

/// All styles in display order (free first).
pub const STYLES: [StyleDescriptor; 12] = [
    style!("happy", "Happy", "😊", Free,
        "extremely happy, wide open smile showing teeth, laughing eyes, pure joy"),
    style!("sad", "Sad", "😢", Free,
        "very sad expression, closed mouth, frowning downturned mouth, pouting lips, big teary eyes, upset"),
    style!("angry", "Angry", "😠", Free,
        "extremely angry facial expression, eyebrows down and together, gritted teeth showing, \
         mouth open yelling, fierce intense rage, confrontational, aggressive look"),
    style!("shocked", "Shocked", "😱", Paid,
        "extremely shocked expression, jaw dropped wide open, eyes huge and bulging out, \
         eyebrows raised high, hands on both cheeks, gasping in disbelief"),
    style!("excited", "Excited", "🤩", Paid,
        "extremely excited expression, huge bright smile showing teeth, eyes wide and sparkling with joy, \
         eyebrows raised, hands raised up in celebration, energetic and enthusiastic"),
    style!("thinking", "Thinking", "🤔", Paid,
        "deep thinking expression, hand touching chin, eyes looking up and to the side, \
         eyebrows slightly furrowed, mouth closed in contemplation, pensive and thoughtful"),
    style!("laughing", "Laughing", "😂", Paid,
        "laughing hysterically, eyes squeezed shut with laugh lines, mouth wide open showing teeth, \
         head tilted back slightly, tears of joy"),
    style!("surprised", "Surprised", "😲", Paid,
        "surprised expression, eyebrows raised high, eyes wide open, mouth forming an O shape, \
         slight gasp, caught off guard but not shocked"),
    style!("confused", "Confused", "🤨", Paid,
        "confused expression, one eyebrow raised higher than the other, eyes squinted slightly, \
         mouth twisted to one side, head tilted, puzzled and questioning"),
    style!("serious", "Serious", "😐", Paid,
        "serious professional expression, straight face with no smile, eyes looking directly at camera, \
         mouth closed in firm line, confident and authoritative"),
    style!("smirking", "Smirking", "😏", Paid,
        "smirking expression, one corner of mouth raised in half smile, eyes looking sideways with confidence, \
         knowing and mischievous look"),
    style!("disgusted", "Disgusted", "🤢", Paid,
        "disgusted expression, nose wrinkled and scrunched up, upper lip curled, eyes squinted, \
         repulsed and grossed out"),
];

/// Look up a style by id.
pub fn find(style_id: &str) -> Option<&'static StyleDescriptor> {
    STYLES.iter().find(|s| s.id == style_id)
}

/// Styles of one tier, in catalog order.
pub fn for_tier(tier: Tier) -> Vec<StyleDescriptor> {
    STYLES.iter().copied().filter(|s| s.tier == tier).collect()
}

/// Provider knobs sent with every inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub num_outputs: u32,
    pub aspect_ratio: &'static str,
    pub output_format: &'static str,
    pub output_quality: u32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            num_inference_steps: 28,
            guidance_scale: 3.5,
            num_outputs: 1,
            aspect_ratio: "1:1",
            output_format: "jpg",
            output_quality: 90,
        }
    }
}
