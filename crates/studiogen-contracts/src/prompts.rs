use crate::product::ProductAttributes;
use crate::tasks::TaskKind;

const PRODUCT_LOCK_PREAMBLE: &str = "You are an expert product photographer and digital artist.
CRITICAL INSTRUCTION: The input images are reference views of the REFERENCE PRODUCT. You must generate a new image that features this EXACT product.
Do not change the product's shape, logo, color, material, or core design details.
The product must look 100% identical to the reference images provided.";

const WHITE_BACKGROUND_BODY: &str = "Task: Generate a high-resolution product shot.
Technique: Use the original product visuals to understand 3D shape and details.
Background: Pure white background (#FFFFFF).
Composition: Product centered, occupying 85% of the frame.
Lighting: Studio lighting with soft natural shadow.
Constraints: No text. No decoration. No color enhancement. High resolution.";

const LIFESTYLE_SCENE_BODY: &str = "Task: Generate a lifestyle scene featuring the product in its natural environment.
Style: Luxury minimal style.
Lighting: Natural environment lighting.
Constraint: Keep original color and material. No artistic effects.
Technique: Place original product into realistic lifestyle scene.
Atmosphere: High-end, clean, realistic.";

/// Builds the text prompt for one rendering. Pure: equal inputs always give
/// identical output. `price` and `weight` never reach the model.
pub fn build_prompt(kind: TaskKind, attributes: &ProductAttributes) -> String {
    let body = match kind {
        TaskKind::WhiteBackground => WHITE_BACKGROUND_BODY.to_string(),
        TaskKind::SizeGuide => format!(
            "Task: Display the original product with clean measurement lines.
Dimensions: Use provided real dimensions only: {size}.
Style: Minimal layout. Thin grey lines, black text.
Constraints: Do not cover product details. Add measurement lines clearly indicating height and width.",
            size = attributes.size()
        ),
        TaskKind::DetailCloseup => format!(
            "Task: Ultra realistic macro photography zoom-in on original product details.
Focus: Show texture, surface, joints, and finish based on all input views.
Material Info: {material}.
Constraints: No color enhancement. No filters. Keep it raw and realistic.",
            material = attributes.material()
        ),
        TaskKind::WearingPhoto => format!(
            "Task: Generate a realistic photo of a real human model wearing or holding the product.
Model Characteristics: The model must have Middle Eastern facial features.
Scale: CRITICAL. Maintain real scale based on the size: {size}. Do not enlarge. Do not exaggerate.
Technique: Place the original product onto the model.
Lighting: Natural lighting with realistic shadows.
Style: Professional photography, natural look.",
            size = attributes.size()
        ),
        TaskKind::LifestyleScene => LIFESTYLE_SCENE_BODY.to_string(),
    };
    format!("{PRODUCT_LOCK_PREAMBLE}\n\n{body}")
}
