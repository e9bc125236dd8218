/*!
 * Translation prompt construction.
 */

use crate::language_utils::display_language;

/// Build the instruction prompt sent to the model for one request
pub fn build_prompt(text: &str, target_language: &str) -> String {
    let language = display_language(target_language);
    let mut prompt = format!(
        "You are a professional translator.\n\
         - Translate the following text into {language}.\n\
         - Output must be {language} only.\n\
         - Keep tone and nuance.\n\
         - Do not add explanations.\n\
         ---\n\
         {text}"
    );
    prompt.push('\n');
    prompt
}
