use crate::adjacency;
use crate::camera::PrerenderStatus;
use crate::map_data::Layer;
use crate::render::{DrawRequest, RenderSink};

use super::UniverseController;

const BACKGROUND_TINT: f32 = 0.5;
const INACTIVE_TINT: f32 = 0.75;
const INACTIVE_ALPHA: f32 = 0.5;

impl UniverseController {
    /// Issues one draw request per loaded map: parallax background first,
    /// then the foreground with inactive maps faded.
    pub fn draw(&mut self, sink: &mut dyn RenderSink) {
        if self.prerender_status == PrerenderStatus::Ready {
            let bounds = self
                .active_map_name
                .as_deref()
                .and_then(|name| self.map_data(Layer::Foreground, name))
                .map(|data| adjacency::camera_region(data, &self.config));
            if let Some(bounds) = bounds {
                let location = (self.camera.x as i32, self.camera.y as i32);
                self.camera.configure_prerender(bounds, location);
            }
            self.prerender_status = PrerenderStatus::Done;
        }

        for name in self.loaded_map_names(Layer::Background) {
            let region = self.render_region(&name, Layer::Background);
            sink.draw_region(&DrawRequest {
                map: name,
                layer: Layer::Background,
                screen_x: region.x,
                screen_y: region.y,
                scale: self.config.scale_for_layer(Layer::Background),
                tint: BACKGROUND_TINT,
                alpha: 1.0,
            });
        }

        for name in self.loaded_map_names(Layer::Foreground) {
            let region = self.render_region(&name, Layer::Foreground);
            let active = self.active_map_name.as_deref() == Some(name.as_str());
            let (tint, alpha) = if active {
                (1.0, 1.0)
            } else {
                (INACTIVE_TINT, INACTIVE_ALPHA)
            };
            sink.draw_region(&DrawRequest {
                map: name,
                layer: Layer::Foreground,
                screen_x: region.x,
                screen_y: region.y,
                scale: self.config.scale_for_layer(Layer::Foreground),
                tint,
                alpha,
            });
        }
    }
}
