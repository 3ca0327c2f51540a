use crate::images::{image_data_url, MimeLabeling, UploadedImage};
use crate::messages::{ChatMessage, ContentPart};

pub fn text_part(question: &str) -> ContentPart {
    ContentPart::text(question)
}

/// Single user message: one image part per data URL, in order, then the
/// question as a text part.
pub fn user_message_with_parts(question: &str, data_urls: &[String]) -> ChatMessage {
    let mut parts: Vec<ContentPart> = data_urls
        .iter()
        .map(|url| ContentPart::image_url(url.clone()))
        .collect();
    parts.push(text_part(question));
    ChatMessage::user(parts)
}

/// Like [`build_messages`], for images that were already encoded.
pub fn messages_from_data_urls(question: &str, data_urls: &[String]) -> Vec<ChatMessage> {
    if data_urls.is_empty() {
        return vec![ChatMessage::user(question)];
    }
    vec![user_message_with_parts(question, data_urls)]
}

/// Always emits content parts, even for an empty image list.
pub fn build_multimodal_messages(
    question: &str,
    images: &[UploadedImage],
    labeling: MimeLabeling,
) -> Vec<ChatMessage> {
    let urls = encode_all(images, labeling);
    vec![user_message_with_parts(question, &urls)]
}

/// Plain string content without images, content parts otherwise.
pub fn build_messages(
    question: &str,
    images: &[UploadedImage],
    labeling: MimeLabeling,
) -> Vec<ChatMessage> {
    messages_from_data_urls(question, &encode_all(images, labeling))
}

fn encode_all(images: &[UploadedImage], labeling: MimeLabeling) -> Vec<String> {
    images
        .iter()
        .map(|image| image_data_url(image, labeling))
        .collect()
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    use super::*;
    use crate::messages::{MessageContent, Role};

    fn jpeg() -> UploadedImage {
        UploadedImage::new("a.jpg", vec![0xff, 0xd8, 0xff, 0xdb, 0x00, 0x43])
    }

    #[test]
    fn text_only_question_is_plain_string() {
        let messages = build_messages("What is 2+2?", &[], MimeLabeling::Detected);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(
            messages[0].content,
            MessageContent::Text("What is 2+2?".to_string())
        );
    }

    #[test]
    fn image_parts_come_before_question() -> anyhow::Result<()> {
        let image = jpeg();
        let messages = build_messages("Describe", &[image.clone()], MimeLabeling::Detected);
        assert_eq!(messages.len(), 1);
        let MessageContent::Parts(parts) = &messages[0].content else {
            anyhow::bail!("expected content parts");
        };
        assert_eq!(parts.len(), 2);
        let ContentPart::ImageUrl { image_url } = &parts[0] else {
            anyhow::bail!("expected image part first");
        };
        let encoded = image_url
            .url
            .strip_prefix("data:image/jpeg;base64,")
            .unwrap_or_default();
        assert_eq!(BASE64.decode(encoded)?, image.bytes);
        assert_eq!(parts[1], ContentPart::text("Describe"));
        Ok(())
    }

    #[test]
    fn multimodal_builder_keeps_parts_without_images() {
        let messages = build_multimodal_messages("", &[], MimeLabeling::Detected);
        assert_eq!(
            messages,
            vec![ChatMessage::user(vec![ContentPart::text("")])]
        );
    }

    #[test]
    fn images_keep_input_order() {
        let first = UploadedImage::new("1.png", b"one".to_vec());
        let second = UploadedImage::new("2.png", b"two".to_vec());
        let messages =
            build_multimodal_messages("q", &[first, second], MimeLabeling::AlwaysJpeg);
        let MessageContent::Parts(parts) = &messages[0].content else {
            panic!("expected content parts");
        };
        let urls: Vec<&str> = parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                ContentPart::Text { .. } => None,
            })
            .collect();
        assert_eq!(
            urls,
            vec!["data:image/jpeg;base64,b25l", "data:image/jpeg;base64,dHdv"]
        );
    }

    #[test]
    fn building_is_pure() {
        let images = vec![jpeg()];
        assert_eq!(
            build_messages("same", &images, MimeLabeling::Detected),
            build_messages("same", &images, MimeLabeling::Detected)
        );
    }
}
