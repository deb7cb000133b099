use crate::map_data::Layer;

/// Where and how one visible map should be drawn this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRequest {
    pub map: String,
    pub layer: Layer,
    pub screen_x: i32,
    pub screen_y: i32,
    pub scale: f32,
    pub tint: f32,
    pub alpha: f32,
}

/// Rendering collaborator. The core decides placement and tint; the sink
/// owns every draw primitive.
pub trait RenderSink {
    fn draw_region(&mut self, request: &DrawRequest);
}

impl RenderSink for Vec<DrawRequest> {
    fn draw_region(&mut self, request: &DrawRequest) {
        self.push(request.clone());
    }
}
