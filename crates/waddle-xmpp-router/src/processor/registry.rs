use std::sync::{Arc, PoisonError, RwLock};

use minidom::Element;
use tracing::{debug, info, warn};

use super::{ElementPath, XmppProcessor};
use crate::error::XmppError;
use crate::packet::Packet;
use crate::session::Session;

struct RegisteredProcessor {
    processor: Arc<dyn XmppProcessor>,
    paths: Vec<ElementPath>,
}

impl RegisteredProcessor {
    fn matches(&self, packet: &Packet) -> bool {
        self.paths.iter().any(|path| path.matches(packet))
    }
}

/// Processors by id, kept in registration order.
///
/// Element paths are read once at registration.
#[derive(Default)]
pub struct ProcessorRegistry {
    processors: RwLock<Vec<RegisteredProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor. A taken id is rejected and the registered set
    /// stays as it was.
    pub fn register(&self, processor: Arc<dyn XmppProcessor>) -> Result<(), XmppError> {
        let mut processors = self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let id = processor.id();
        if processors.iter().any(|p| p.processor.id() == id) {
            warn!(processor = %id, "Processor id already registered");
            return Err(XmppError::DuplicateProcessorId(id.to_string()));
        }

        let paths = processor.element_paths();
        info!(processor = %id, paths = paths.len(), "Processor registered");
        processors.push(RegisteredProcessor { processor, paths });
        Ok(())
    }

    pub fn unregister(&self, id: &str) -> Option<Arc<dyn XmppProcessor>> {
        let mut processors = self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let position = processors.iter().position(|p| p.processor.id() == id)?;
        debug!(processor = %id, "Processor unregistered");
        Some(processors.remove(position).processor)
    }

    /// Processors handling the packet, in registration order.
    pub fn matching(&self, packet: &Packet) -> Vec<Arc<dyn XmppProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|p| p.matches(packet))
            .map(|p| Arc::clone(&p.processor))
            .collect()
    }

    /// Ids of the processors handling the packet, in registration order.
    pub fn match_ids(&self, packet: &Packet) -> Vec<String> {
        self.matching(packet)
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn XmppProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|p| p.processor.id() == id)
            .map(|p| Arc::clone(&p.processor))
    }

    pub fn ids(&self) -> Vec<String> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.processor.id().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stream features every processor offers the session.
    pub fn stream_features(&self, session: Option<&Session>) -> Vec<Element> {
        self.snapshot()
            .iter()
            .flat_map(|p| p.stream_features(session))
            .collect()
    }

    /// Disco features of every processor, without duplicates.
    pub fn disco_features(&self, session: Option<&Session>) -> Vec<String> {
        let mut features: Vec<String> = Vec::new();
        for feature in self.snapshot().iter().flat_map(|p| p.disco_features(session)) {
            if !features.contains(&feature) {
                features.push(feature);
            }
        }
        features
    }

    fn snapshot(&self) -> Vec<Arc<dyn XmppProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| Arc::clone(&p.processor))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ns;

    struct PathProcessor {
        id: &'static str,
        paths: Vec<ElementPath>,
        disco: Vec<String>,
    }

    impl XmppProcessor for PathProcessor {
        fn id(&self) -> &str {
            self.id
        }

        fn element_paths(&self) -> Vec<ElementPath> {
            self.paths.clone()
        }

        fn disco_features(&self, _session: Option<&Session>) -> Vec<String> {
            self.disco.clone()
        }
    }

    fn processor(id: &'static str, paths: Vec<ElementPath>) -> Arc<PathProcessor> {
        Arc::new(PathProcessor {
            id,
            paths,
            disco: vec!["urn:shared".to_string(), id.to_string()],
        })
    }

    fn vcard_get() -> Packet {
        let element: Element =
            "<iq xmlns='jabber:client' type='get' id='1'><vCard xmlns='vcard-temp'/></iq>"
                .parse()
                .unwrap();
        Packet::from_element(&element).unwrap()
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = ProcessorRegistry::new();
        registry
            .register(processor("vcard-temp", vec![ElementPath::new(&["iq", "vCard"], ns::VCARD)]))
            .unwrap();

        let result = registry.register(processor("vcard-temp", vec![]));
        assert!(matches!(result, Err(XmppError::DuplicateProcessorId(_))));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.match_ids(&vcard_get()), vec!["vcard-temp"]);
    }

    #[test]
    fn test_match_in_registration_order() {
        let registry = ProcessorRegistry::new();
        registry
            .register(processor("iq-all", vec![ElementPath::new(&["iq"], ns::JABBER_CLIENT)]))
            .unwrap();
        registry
            .register(processor("presence", vec![ElementPath::new(&["presence"], ns::JABBER_CLIENT)]))
            .unwrap();
        registry
            .register(processor(
                "vcard",
                vec![
                    ElementPath::new(&["iq", "VCARD"], ns::VCARD),
                    ElementPath::new(&["iq", "vCard"], ns::VCARD),
                ],
            ))
            .unwrap();

        assert_eq!(registry.match_ids(&vcard_get()), vec!["iq-all", "vcard"]);
    }

    #[test]
    fn test_unregister() {
        let registry = ProcessorRegistry::new();
        registry
            .register(processor("vcard", vec![ElementPath::new(&["iq", "vCard"], ns::VCARD)]))
            .unwrap();

        assert!(registry.unregister("vcard").is_some());
        assert!(registry.is_empty());
        assert!(registry.match_ids(&vcard_get()).is_empty());
    }

    #[test]
    fn test_disco_features_deduplicated() {
        let registry = ProcessorRegistry::new();
        registry.register(processor("a", vec![])).unwrap();
        registry.register(processor("b", vec![])).unwrap();

        assert_eq!(registry.disco_features(None), vec!["urn:shared", "a", "b"]);
        assert_eq!(registry.ids(), vec!["a", "b"]);
    }
}
