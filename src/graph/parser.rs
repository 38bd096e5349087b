//! Parser for the graph text format.

use std::collections::HashSet;

use thiserror::Error;

use super::*;

/// Error raised while parsing graph text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct GraphParseError {
    pub line: usize,
    pub message: String,
}

pub fn parse_graph(text: &str) -> Result<Graph, GraphParseError> {
    let mut graph = Graph::new();
    let mut defined: HashSet<String> = HashSet::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = match raw.find(';') {
            Some(comment) => &raw[..comment],
            None => raw,
        };
        if line.trim().is_empty() {
            continue;
        }

        let (node, role) = LineParser::new(line)
            .parse_node()
            .map_err(|message| GraphParseError { line: line_no, message })?;

        for input in node.input_nodes() {
            if !defined.contains(input) {
                return Err(GraphParseError {
                    line: line_no,
                    message: format!("use of undefined value %{input}"),
                });
            }
        }
        if !defined.insert(node.name.clone()) {
            return Err(GraphParseError {
                line: line_no,
                message: format!("value %{} defined twice", node.name),
            });
        }

        if let Some(kind) = role {
            graph.signature.inputs.push(InputSpec {
                name: node.name.clone(),
                kind,
            });
        }
        if node.kind == NodeKind::Output {
            graph
                .signature
                .outputs
                .extend(node.input_nodes().map(str::to_string));
        }
        graph.nodes.push(node);
    }

    Ok(graph)
}

struct LineParser<'a> {
    text: &'a str,
    pos: usize,
    /// Signature role of a placeholder, recorded while parsing it.
    role: Option<InputKind>,
}

impl<'a> LineParser<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0, role: None }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn current_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace();
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        if self.try_read(ch) {
            Ok(())
        } else {
            Err(format!("expected '{}' at '{}'", ch, self.rest().trim()))
        }
    }

    fn read_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        self.skip_whitespace();
        let start = self.pos;
        while self.current_char().is_some_and(&pred) {
            self.advance();
        }
        &self.text[start..self.pos]
    }

    fn read_identifier(&mut self) -> Result<&'a str, String> {
        let ident = self.read_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if ident.is_empty() {
            Err(format!("expected identifier at '{}'", self.rest().trim()))
        } else {
            Ok(ident)
        }
    }

    fn read_value_name(&mut self) -> Result<&'a str, String> {
        self.expect('%')?;
        self.read_identifier()
    }

    fn parse_node(mut self) -> Result<(Node, Option<InputKind>), String> {
        self.skip_whitespace();

        let mut node = if self.rest().starts_with("output") {
            self.read_identifier()?;
            let mut node = Node::new("output", NodeKind::Output);
            node.args = self.parse_args()?;
            node
        } else {
            let name = self.read_value_name()?;
            self.expect('=')?;
            let kind_str = self.read_identifier()?;
            let kind = NodeKind::from_str(kind_str)
                .ok_or_else(|| format!("unknown node kind '{kind_str}'"))?;
            let mut node = Node::new(name, kind);
            self.parse_body(&mut node)?;
            node
        };

        if self.try_read(':') {
            node.meta.tensor = Some(self.parse_tensor_meta()?);
        }
        if self.try_read('@') {
            let tag = self.read_identifier()?;
            node.meta.delegation_tag = Some(tag.to_string());
        }

        self.skip_whitespace();
        if !self.rest().is_empty() {
            return Err(format!("unexpected trailing text '{}'", self.rest()));
        }
        Ok((node, self.role))
    }

    fn parse_body(&mut self, node: &mut Node) -> Result<(), String> {
        match node.kind {
            NodeKind::Placeholder => {
                let role_str = self.read_identifier()?;
                let role = InputKind::from_str(role_str)
                    .ok_or_else(|| format!("unknown placeholder role '{role_str}'"))?;
                self.role = Some(role);
            }
            NodeKind::Output => return Err("output is written as output(...)".to_string()),
            NodeKind::GetAttr => {
                node.target = Some(self.read_identifier()?.to_string());
            }
            NodeKind::CallFunction | NodeKind::CallModule | NodeKind::CallMethod => {
                node.target = Some(self.read_identifier()?.to_string());
                node.args = self.parse_args()?;
            }
        }
        Ok(())
    }

    fn parse_args(&mut self) -> Result<Vec<Argument>, String> {
        self.expect('(')?;
        let mut args = Vec::new();
        if self.try_read(')') {
            return Ok(args);
        }
        loop {
            args.push(self.parse_argument()?);
            if self.try_read(')') {
                return Ok(args);
            }
            self.expect(',')?;
        }
    }

    fn parse_argument(&mut self) -> Result<Argument, String> {
        self.skip_whitespace();
        match self.current_char() {
            Some('%') => Ok(Argument::Node(self.read_value_name()?.to_string())),
            Some('[') => {
                self.advance();
                let mut ints = Vec::new();
                if self.try_read(']') {
                    return Ok(Argument::Ints(ints));
                }
                loop {
                    ints.push(self.parse_int()?);
                    if self.try_read(']') {
                        return Ok(Argument::Ints(ints));
                    }
                    self.expect(',')?;
                }
            }
            _ => {
                let literal = self.read_while(|c| {
                    c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')
                });
                if literal.is_empty() {
                    return Err(format!("expected argument at '{}'", self.rest().trim()));
                }
                if let Ok(value) = literal.parse::<i64>() {
                    Ok(Argument::Int(value))
                } else {
                    literal
                        .parse::<f64>()
                        .map(Argument::Float)
                        .map_err(|_| format!("invalid number '{literal}'"))
                }
            }
        }
    }

    fn parse_int(&mut self) -> Result<i64, String> {
        let literal = self.read_while(|c| c.is_ascii_digit() || c == '-');
        literal
            .parse::<i64>()
            .map_err(|_| format!("invalid integer '{literal}'"))
    }

    fn parse_tensor_meta(&mut self) -> Result<TensorMeta, String> {
        let dtype_str = self.read_while(|c| c.is_ascii_alphanumeric());
        let dtype =
            DType::from_str(dtype_str).ok_or_else(|| format!("unknown dtype '{dtype_str}'"))?;
        self.expect('[')?;
        let mut shape = Vec::new();
        if !self.try_read(']') {
            loop {
                let dim = self.read_while(|c| c.is_ascii_digit());
                shape.push(
                    dim.parse::<u64>()
                        .map_err(|_| format!("invalid dimension '{dim}'"))?,
                );
                if self.try_read(']') {
                    break;
                }
                self.expect(',')?;
            }
        }
        Ok(TensorMeta::new(dtype, shape))
    }
}
