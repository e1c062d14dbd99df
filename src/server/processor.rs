// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{collections::HashMap, future, sync::Arc};

use crate::{
    frame::{ExceptionCode, Request, Response},
    image::ProcessImage,
    unit::UnitId,
};

use super::{Service, SlaveRequest};

/// Unit selection of a [`RequestProcessor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Unit whose image answers requests for unknown units,
    /// see [`Self::fall_back_to_default_unit`].
    pub default_unit_id: Option<UnitId>,

    /// Don't answer requests for unknown units with
    /// [`ExceptionCode::IllegalDataAddress`].
    pub forgive_unknown_unit_id: bool,

    /// Answer forgiven requests for unknown units from the default unit.
    pub fall_back_to_default_unit: bool,
}

impl ProcessorConfig {
    #[must_use]
    pub const fn default_unit_id(mut self, default_unit_id: UnitId) -> Self {
        self.default_unit_id = Some(default_unit_id);
        self
    }

    #[must_use]
    pub const fn forgive_unknown_unit_id(mut self, forgive: bool) -> Self {
        self.forgive_unknown_unit_id = forgive;
        self
    }

    #[must_use]
    pub const fn fall_back_to_default_unit(mut self, fall_back: bool) -> Self {
        self.fall_back_to_default_unit = fall_back;
        self
    }
}

/// Answers requests from the process image of the addressed unit.
#[derive(Debug, Clone, Default)]
pub struct RequestProcessor {
    images: HashMap<UnitId, Arc<dyn ProcessImage>>,
    config: ProcessorConfig,
}

impl RequestProcessor {
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            images: HashMap::new(),
            config,
        }
    }

    /// Serves `image` for `unit_id`, replacing any previous image.
    #[must_use]
    pub fn with_image(mut self, unit_id: UnitId, image: Arc<dyn ProcessImage>) -> Self {
        self.insert_image(unit_id, image);
        self
    }

    pub fn insert_image(
        &mut self,
        unit_id: UnitId,
        image: Arc<dyn ProcessImage>,
    ) -> Option<Arc<dyn ProcessImage>> {
        self.images.insert(unit_id, image)
    }

    #[must_use]
    pub fn image(&self, unit_id: UnitId) -> Option<&Arc<dyn ProcessImage>> {
        self.images.get(&unit_id)
    }

    #[must_use]
    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Executes `request` on the image of `unit_id`.
    ///
    /// Returns `None` if the request must not be answered.
    #[must_use]
    pub fn process(
        &self,
        unit_id: UnitId,
        request: &Request,
    ) -> Option<Result<Response, ExceptionCode>> {
        let image = match self.images.get(&unit_id) {
            Some(image) => image,
            None if !self.config.forgive_unknown_unit_id => {
                log::debug!("Rejecting request for unknown unit {unit_id}");
                return Some(Err(ExceptionCode::IllegalDataAddress));
            }
            None if self.config.fall_back_to_default_unit => {
                let Some(image) = self
                    .config
                    .default_unit_id
                    .and_then(|default_unit_id| self.images.get(&default_unit_id))
                else {
                    log::debug!("Ignoring request for unit {unit_id} without default unit");
                    return None;
                };
                image
            }
            None => {
                log::debug!("Ignoring request for unknown unit {unit_id}");
                return None;
            }
        };
        let result = request.execute(image.as_ref());
        if let Err(exception) = &result {
            log::debug!("Request {request:?} for unit {unit_id} failed: {exception}");
        }
        Some(result)
    }
}

impl Service for RequestProcessor {
    type Request = SlaveRequest;
    type Response = Option<Response>;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        future::ready(self.process(req.unit_id, &req.request).transpose())
    }
}
